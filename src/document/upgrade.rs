//! In-memory upgrade of documents older than [`DOCUMENT_VERSION`].
//!
//! - producers without `kdenlive:id` get it from their id
//! - automatic track composites without `internal_added` get 237
//! - guides stored as frames (before 0.83) become seconds

use log::info;

use super::reader::read_profile;
use super::xml::Element;
use super::DOCUMENT_VERSION;
use crate::entities::attrs::format_number;
use crate::entities::keys::*;
use crate::entities::{ProducerId, Profile};

/// Guides were stored in frames before this version.
const SECONDS_GUIDES_VERSION: f64 = 0.83;

/// Version of a document tree; documents without one count as 0.
pub fn document_version(root: &Element) -> f64 {
    root.child("kdenlivedoc").and_then(|d| d.attr_f64("version")).unwrap_or(0.0)
}

/// Upgrade `root` in place. Returns true when anything was converted.
pub fn upgrade(root: &mut Element, fallback: &Profile) -> bool {
    let version = document_version(root);
    if version >= DOCUMENT_VERSION {
        return false;
    }
    info!("Upgrading document from version {} to {}", format_number(version), format_number(DOCUMENT_VERSION));
    let fps = read_profile(root, fallback).fps();

    for producer in root.children.iter_mut().filter(|c| c.name == "producer") {
        if producer.property(P_CLIP_ID).is_some() {
            continue;
        }
        let Some(id) = producer.attr("id").map(str::to_string) else {
            continue;
        };
        if id == BLACK_ID {
            continue;
        }
        let clip_id = ProducerId::parse(&id).clip_id().to_string();
        producer.set_property(P_CLIP_ID, clip_id);
    }

    if let Some(tractor) = root.child_mut("tractor") {
        for transition in tractor.children.iter_mut().filter(|c| c.name == "transition") {
            let automatic = transition.property(X_AUTOMATIC) == Some("1");
            let composite = transition.property(P_SERVICE).is_some_and(|s| s == "composite" || s == "mix");
            if automatic && composite && transition.property(X_INTERNAL).is_none() {
                transition.set_property(X_INTERNAL, INTERNAL_TRACK.to_string());
            }
        }
    }

    let doc = match root.child_mut("kdenlivedoc") {
        Some(doc) => doc,
        None => {
            root.push(Element::new("kdenlivedoc"));
            let last = root.children.len() - 1;
            &mut root.children[last]
        }
    };
    if version < SECONDS_GUIDES_VERSION {
        if let Some(guides) = doc.child_mut("guides") {
            for guide in guides.children.iter_mut().filter(|c| c.name == "guide") {
                if let Some(frames) = guide.attr_f64("time") {
                    guide.set_attr("time", format_number(frames / fps));
                }
            }
        }
    }
    doc.set_attr("version", format_number(DOCUMENT_VERSION));
    root.set_attr("upgraded", 1);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    const OLD: &str = r#"<mlt profile="dv_pal">
        <producer id="3_2_audio"><property name="resource">/m/a.wav</property></producer>
        <producer id="3"><property name="resource">/m/a.wav</property></producer>
        <tractor>
          <transition><property name="mlt_service">composite</property><property name="automatic">1</property></transition>
          <transition><property name="mlt_service">luma</property><property name="automatic">1</property></transition>
        </tractor>
        <kdenlivedoc version="0.8"><guides><guide time="50" comment="x"/></guides></kdenlivedoc>
    </mlt>"#;

    #[test]
    fn test_upgrade_old_document() {
        let mut root = Element::parse(OLD).expect("parse");
        assert!(upgrade(&mut root, &Profile::default()));
        assert_eq!(root.attr("upgraded"), Some("1"));
        assert_eq!(document_version(&root), DOCUMENT_VERSION);

        let ids: Vec<_> = root.children_named("producer").filter_map(|p| p.property(P_CLIP_ID)).collect();
        assert_eq!(ids, vec!["3", "3"]);

        let tractor = root.child("tractor").expect("tractor");
        let internal: Vec<_> = tractor.children_named("transition").map(|t| t.property(X_INTERNAL)).collect();
        assert_eq!(internal, vec![Some("237"), None]);

        let guide = root
            .child("kdenlivedoc")
            .and_then(|d| d.child("guides"))
            .and_then(|g| g.child("guide"))
            .expect("guide");
        assert_eq!(guide.attr("time"), Some("2"));
    }

    #[test]
    fn test_current_document_untouched() {
        let text = format!(r#"<mlt><kdenlivedoc version="{}"/></mlt>"#, format_number(DOCUMENT_VERSION));
        let mut root = Element::parse(&text).expect("parse");
        let before = root.clone();
        assert!(!upgrade(&mut root, &Profile::default()));
        assert_eq!(root, before);
    }

    #[test]
    fn test_missing_section_is_added() {
        let mut root = Element::parse("<mlt/>").expect("parse");
        assert!(upgrade(&mut root, &Profile::default()));
        assert_eq!(document_version(&root), DOCUMENT_VERSION);
    }
}
