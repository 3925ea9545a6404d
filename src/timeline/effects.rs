//! Effect chain edits on clips and tracks.
//!
//! Every edit goes through the model's atomic `apply`, so the published
//! graph picks up the new filters and the touched range is reported.

use log::debug;

use super::model::TimelineModel;
use crate::entities::effects::catalog;
use crate::entities::effects::params::ParamContext;
use crate::entities::{Effect, EffectChain, Entry};
use crate::error::{TimelineError, TimelineResult};

/// Where an effect chain lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectHost {
    /// The cut starting at `start` on `track`
    Clip { track: usize, start: i32 },
    /// A whole track
    Track(usize),
}

impl EffectHost {
    pub fn track(&self) -> usize {
        match *self {
            EffectHost::Clip { track, .. } | EffectHost::Track(track) => track,
        }
    }
}

impl TimelineModel {
    pub fn effect_chain(&self, host: EffectHost) -> Option<&EffectChain> {
        match host {
            EffectHost::Clip { track, start } => self.cut(track, start).map(|c| &c.effects),
            EffectHost::Track(track) => self.tracks.get(track).filter(|_| track > 0).map(|t| &t.effects),
        }
    }

    /// Mutable chain of an editable host; marks its frames as changed.
    fn chain_mut(&mut self, host: EffectHost) -> TimelineResult<&mut EffectChain> {
        self.editable(host.track())?;
        let (track, start, end) = match host {
            EffectHost::Clip { track, start } => {
                let index = self.cut_index(track, start)?;
                let len = self.tracks[track].playlist.entries()[index].length();
                (track, start, start + len)
            }
            EffectHost::Track(track) => (track, 0, self.tracks[track].duration()),
        };
        self.touch(track, start, end);
        match host {
            EffectHost::Clip { track, start } => {
                let playlist = &mut self.tracks[track].playlist;
                let index = playlist
                    .cut_index_starting_at(start)
                    .ok_or_else(|| TimelineError::invalid(format!("no clip at frame {} on track {}", start, track)))?;
                playlist
                    .entry_mut(index)
                    .and_then(Entry::as_cut_mut)
                    .map(|cut| &mut cut.effects)
                    .ok_or_else(|| TimelineError::invalid(format!("no clip at frame {} on track {}", start, track)))
            }
            EffectHost::Track(track) => Ok(&mut self.tracks[track].effects),
        }
    }

    /// Build an effect from its recipe with profile-relative defaults.
    pub fn create_effect(&self, host: EffectHost, effect_id: &str) -> TimelineResult<Effect> {
        let recipe = catalog::effect(effect_id)
            .ok_or_else(|| TimelineError::invalid(format!("unknown effect {}", effect_id)))?;
        let has_proxy = match host {
            EffectHost::Clip { track, start } => self
                .cut(track, start)
                .and_then(|c| self.registry.get_clip(&c.clip_id))
                .is_some_and(|clip| clip.proxy().is_some()),
            EffectHost::Track(_) => false,
        };
        let ctx = ParamContext::from_profile(self.profile());
        Ok(Effect::from_recipe(recipe, &ctx, has_proxy))
    }

    /// Append a catalog effect; returns its ordinal.
    pub fn add_effect(&mut self, host: EffectHost, effect_id: &str) -> TimelineResult<usize> {
        let effect = self.create_effect(host, effect_id)?;
        self.insert_effect(host, effect)
    }

    /// Append a prepared effect; returns its ordinal.
    pub fn insert_effect(&mut self, host: EffectHost, effect: Effect) -> TimelineResult<usize> {
        self.apply("add effect", |m| {
            debug!("Add effect {} on {:?}", effect.id, host);
            Ok(m.chain_mut(host)?.add(effect))
        })
    }

    /// Replace the effect at `index`, keeping its window and sync flag.
    pub fn update_effect(&mut self, host: EffectHost, index: usize, effect: Effect) -> TimelineResult<()> {
        self.apply("update effect", |m| m.chain_mut(host)?.update(index, effect))
    }

    pub fn remove_effect(&mut self, host: EffectHost, index: usize) -> TimelineResult<Effect> {
        self.apply("remove effect", |m| m.chain_mut(host)?.remove(index))
    }

    pub fn set_effect_enabled(&mut self, host: EffectHost, index: usize, enabled: bool) -> TimelineResult<()> {
        self.apply("toggle effect", |m| m.chain_mut(host)?.set_enabled(index, enabled))
    }

    pub fn move_effect(&mut self, host: EffectHost, from: usize, to: usize) -> TimelineResult<()> {
        self.apply("move effect", |m| m.chain_mut(host)?.move_effect(from, to))
    }

    /// Set an effect's active window, optionally tying it to the host clip.
    pub fn set_effect_window(
        &mut self,
        host: EffectHost,
        index: usize,
        in_frame: i32,
        out_frame: i32,
        sync: bool,
    ) -> TimelineResult<()> {
        if in_frame < 0 || out_frame < in_frame {
            return Err(TimelineError::invalid(format!("bad effect window [{}, {}]", in_frame, out_frame)));
        }
        self.apply("effect window", |m| {
            let effect = m
                .chain_mut(host)?
                .get_mut(index)
                .ok_or_else(|| TimelineError::invalid(format!("no effect at ordinal {}", index)))?;
            effect.window = Some((in_frame, out_frame));
            effect.sync_in_out = sync;
            Ok(())
        })
    }

    /// Set one user-facing parameter value.
    pub fn set_effect_param(&mut self, host: EffectHost, index: usize, name: &str, value: &str) -> TimelineResult<()> {
        self.apply("effect parameter", |m| {
            let effect = m
                .chain_mut(host)?
                .get_mut(index)
                .ok_or_else(|| TimelineError::invalid(format!("no effect at ordinal {}", index)))?;
            effect.set_param(name, value);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event_bus::{EventBus, Notifier};
    use crate::core::events::TimelineChanged;
    use crate::entities::{ClipKind, ClipState, Profile, SourceClip, TrackKind};
    use crate::timeline::model::InsertMode;

    fn model() -> TimelineModel {
        let mut m = TimelineModel::new(Profile::default(), Notifier::silent());
        m.add_track(1, TrackKind::Video).expect("track");
        m.registry_mut()
            .add_clip(SourceClip::new("c1", ClipKind::AV, "/m/a.mov").with_length(100))
            .expect("c1");
        m.registry_mut()
            .add_clip(SourceClip::new("c2", ClipKind::AV, "/m/b.mov").with_length(100).with_proxy("/p/b.mkv"))
            .expect("c2");
        m.insert_clip(1, 0, "c1", ClipState::Original, InsertMode::Normal).expect("a");
        m.insert_clip(1, 100, "c2", ClipState::Original, InsertMode::Normal).expect("b");
        m
    }

    const A: EffectHost = EffectHost::Clip { track: 1, start: 0 };
    const B: EffectHost = EffectHost::Clip { track: 1, start: 100 };

    #[test]
    fn test_add_effect_evaluates_defaults() {
        let mut m = model();
        assert_eq!(m.add_effect(A, "brightness").expect("add"), 1);
        assert_eq!(m.add_effect(A, "crop").expect("add"), 2);
        assert_eq!(m.add_effect(B, "crop").expect("add"), 1);

        let chain = m.effect_chain(A).expect("chain");
        assert_eq!(chain.get(1).and_then(|e| e.param("level")), Some("0=100;"));
        assert_eq!(chain.get(2).and_then(|e| e.param("use_profile")), Some("0"));
        let proxied = m.effect_chain(B).expect("chain");
        assert_eq!(proxied.get(1).and_then(|e| e.param("use_profile")), Some("1"));
        assert!(m.check_invariants().is_ok());
    }

    #[test]
    fn test_unknown_effect_and_bad_host() {
        let mut m = model();
        assert_eq!(m.add_effect(A, "no_such_fx").expect_err("unknown").code(), "INVALID_ARGUMENT");
        let blank = EffectHost::Clip { track: 1, start: 50 };
        assert!(m.add_effect(blank, "brightness").is_err());
        assert!(m.add_effect(EffectHost::Track(0), "brightness").is_err());
    }

    #[test]
    fn test_track_effects_and_locking() {
        let mut m = model();
        let host = EffectHost::Track(1);
        m.add_effect(host, "volume").expect("volume");
        m.add_effect(host, "brightness").expect("brightness");
        m.move_effect(host, 2, 1).expect("move");
        let ids: Vec<_> = m.effect_chain(host).expect("chain").iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids, vec!["brightness", "volume"]);

        m.set_locked(1, true).expect("lock");
        assert_eq!(m.remove_effect(host, 1).expect_err("locked").code(), "LOCKED");
        m.set_locked(1, false).expect("unlock");
        assert_eq!(m.remove_effect(host, 1).expect("remove").id, "brightness");
    }

    #[test]
    fn test_update_toggle_and_window() {
        let mut m = model();
        m.add_effect(A, "fadein").expect("add");
        m.set_effect_window(A, 1, 0, 24, true).expect("window");
        m.update_effect(A, 1, Effect::raw("fadeout", "volume")).expect("update");
        let fx = m.effect_chain(A).and_then(|c| c.get(1)).expect("fx");
        assert_eq!(fx.id, "fadeout");
        assert_eq!(fx.window, Some((0, 24)));
        assert!(fx.sync_in_out);

        m.set_effect_enabled(A, 1, false).expect("disable");
        assert!(!m.effect_chain(A).and_then(|c| c.get(1)).expect("fx").enabled);
        assert!(m.set_effect_window(A, 1, 30, 10, false).is_err());
        assert!(m.set_effect_enabled(A, 4, true).is_err());
    }

    #[test]
    fn test_effect_edit_reports_host_range() {
        let bus = EventBus::new();
        let mut m = model();
        m.registry_mut().set_notifier(bus.notifier());
        let mut m = TimelineModel::from_parts(
            m.profile().clone(),
            m.tracks().to_vec(),
            m.registry().clone(),
            m.transitions().clone(),
            Vec::new(),
            m.targets(),
            m.still_frames(),
            bus.notifier(),
        )
        .expect("model");
        bus.clear();
        m.add_effect(B, "brightness").expect("add");
        let changed = bus.drain::<TimelineChanged>();
        assert_eq!(changed.len(), 1);
        assert_eq!((changed[0].track, changed[0].start, changed[0].end), (1, 100, 200));
    }
}
