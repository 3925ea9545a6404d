//! Parameter evaluation: profile-relative defaults and factor/offset
//! normalization between user-facing and stored values.
//!
//! Stored value = `(external - offset) / factor`, applied to every keyframe
//! value for animated kinds. Geometry kinds pass through unchanged.

use super::catalog::{ParamDef, ParamKind};
use super::keyframes::Keyframes;
use crate::entities::attrs::format_number;
use crate::entities::profile::Profile;

/// Values `%` defaults are resolved against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamContext {
    pub width: f64,
    pub height: f64,
    pub fps: f64,
    pub dar: f64,
}

impl ParamContext {
    pub fn from_profile(profile: &Profile) -> Self {
        Self {
            width: profile.width as f64,
            height: profile.height as f64,
            fps: profile.fps(),
            dar: profile.dar(),
        }
    }

    fn substitute(&self, text: &str) -> String {
        // longest names first
        text.replace("%width", &format_number(self.width))
            .replace("%height", &format_number(self.height))
            .replace("%fps", &format_number(self.fps))
            .replace("%dar", &format_number(self.dar))
    }
}

/// Resolve a recipe default. Arithmetic defaults (`%width/2`) are evaluated,
/// composite ones (`0/0:%widthx%height:100`) only get their variables replaced.
pub fn resolve_default(default: &str, ctx: &ParamContext) -> String {
    if !default.contains('%') {
        return default.to_string();
    }
    let text = ctx.substitute(default);
    match eval(&text) {
        Some(value) => format_number(value),
        None => text,
    }
}

/// External (user) value to stored value.
pub fn to_internal(def: &ParamDef, external: &str) -> String {
    if !def.is_scaled() {
        return external.to_string();
    }
    let forward = |v: f64| (v - def.offset) / def.factor;
    convert(def, external, forward)
}

/// Stored value to external (user) value.
pub fn to_external(def: &ParamDef, internal: &str) -> String {
    if !def.is_scaled() {
        return internal.to_string();
    }
    let back = |v: f64| v * def.factor + def.offset;
    convert(def, internal, back)
}

fn convert(def: &ParamDef, value: &str, f: impl Fn(f64) -> f64) -> String {
    match def.kind {
        ParamKind::Geometry | ParamKind::AddedGeometry | ParamKind::Bool | ParamKind::List | ParamKind::Color => {
            value.to_string()
        }
        ParamKind::SimpleKeyframe => {
            if value.contains('=') {
                Keyframes::parse(value).map_values(|v| scale(v, &f)).to_string()
            } else {
                scale(value, &f)
            }
        }
        _ => scale(value, &f),
    }
}

fn scale(value: &str, f: &impl Fn(f64) -> f64) -> String {
    match value.trim().parse::<f64>() {
        Ok(v) => format_scaled(f(v)),
        Err(_) => value.to_string(),
    }
}

/// Fewest decimals that read back as `value` to 12 significant digits, so
/// scaling there and back gives the text the user typed.
fn format_scaled(value: f64) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let tolerance = value.abs() * 1e-12;
    (0..=15)
        .map(|decimals| format!("{:.*}", decimals, value))
        .find(|text| text.parse::<f64>().is_ok_and(|v| (v - value).abs() <= tolerance))
        .map(|text| if text.parse::<f64>() == Ok(0.0) { "0".to_string() } else { text })
        .unwrap_or_else(|| value.to_string())
}

/// Evaluate `+ - * /` with parentheses. None when the text is not a pure
/// arithmetic expression.
pub fn eval(text: &str) -> Option<f64> {
    let tokens: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    if tokens.is_empty() {
        return None;
    }
    let mut parser = Expr { tokens, pos: 0 };
    let value = parser.sum()?;
    (parser.pos == parser.tokens.len() && value.is_finite()).then_some(value)
}

struct Expr {
    tokens: Vec<char>,
    pos: usize,
}

impl Expr {
    fn peek(&self) -> Option<char> {
        self.tokens.get(self.pos).copied()
    }

    fn sum(&mut self) -> Option<f64> {
        let mut acc = self.product()?;
        while let Some(op @ ('+' | '-')) = self.peek() {
            self.pos += 1;
            let rhs = self.product()?;
            acc = if op == '+' { acc + rhs } else { acc - rhs };
        }
        Some(acc)
    }

    fn product(&mut self) -> Option<f64> {
        let mut acc = self.atom()?;
        while let Some(op @ ('*' | '/')) = self.peek() {
            self.pos += 1;
            let rhs = self.atom()?;
            acc = if op == '*' { acc * rhs } else { acc / rhs };
        }
        Some(acc)
    }

    fn atom(&mut self) -> Option<f64> {
        match self.peek()? {
            '(' => {
                self.pos += 1;
                let value = self.sum()?;
                if self.peek()? != ')' {
                    return None;
                }
                self.pos += 1;
                Some(value)
            }
            '-' => {
                self.pos += 1;
                Some(-self.atom()?)
            }
            _ => {
                let start = self.pos;
                while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '.') {
                    self.pos += 1;
                }
                let literal: String = self.tokens[start..self.pos].iter().collect();
                literal.parse().ok()
            }
        }
    }
}
