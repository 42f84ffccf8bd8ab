//! Motion and expression selection
//!
//! Models name their motion groups differently. Groups are tried in order
//! and the first one with any motion wins; the motion inside it is picked
//! uniformly at random.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::RenderTarget;

/// Conventional talking motion groups, most specific first
pub const DEFAULT_MOTION_GROUPS: [&str; 2] = ["TapBody", "Idle"];

/// A motion chosen for playback
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MotionChoice {
    pub group: String,
    pub index: usize,
    pub name: String,
}

/// Random motion/expression picker
#[derive(Debug)]
pub struct MotionSelector {
    groups: Vec<String>,
    rng: StdRng,
}

impl MotionSelector {
    /// Seeded selectors repeat the same choices
    pub fn new(groups: Vec<String>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { groups, rng }
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    /// First non-empty group, random motion inside it
    pub fn pick_motion(&mut self, target: &dyn RenderTarget) -> Option<MotionChoice> {
        for group in &self.groups {
            let motions = target.list_motions(group);
            if motions.is_empty() {
                continue;
            }
            let index = self.rng.gen_range(0..motions.len());
            return Some(MotionChoice {
                group: group.clone(),
                index,
                name: motions[index].clone(),
            });
        }
        None
    }

    /// Random expression index, if the model has any
    pub fn pick_expression(&mut self, target: &dyn RenderTarget) -> Option<usize> {
        let count = target.list_expressions().len();
        (count > 0).then(|| self.rng.gen_range(0..count))
    }
}

impl Default for MotionSelector {
    fn default() -> Self {
        Self::new(DEFAULT_MOTION_GROUPS.iter().map(|g| g.to_string()).collect(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use viva_core::VivaResult;

    use crate::{missing, ExpressionRef};

    #[derive(Default)]
    struct Groups {
        motions: HashMap<String, Vec<String>>,
        expressions: Vec<String>,
    }

    impl RenderTarget for Groups {
        fn mouth_parameter(&self, name: &str) -> VivaResult<f32> {
            Err(missing(name))
        }
        fn set_mouth_parameter(&mut self, name: &str, _value: f32) -> VivaResult<()> {
            Err(missing(name))
        }
        fn play_motion(&mut self, _group: &str, _index: usize, _priority: u8) -> VivaResult<()> {
            Ok(())
        }
        fn list_motions(&self, group: &str) -> Vec<String> {
            self.motions.get(group).cloned().unwrap_or_default()
        }
        fn list_expressions(&self) -> Vec<String> {
            self.expressions.clone()
        }
        fn set_expression(&mut self, _expression: &ExpressionRef) -> VivaResult<()> {
            Ok(())
        }
        fn reset_expression(&mut self) -> VivaResult<()> {
            Ok(())
        }
    }

    fn with_groups(groups: &[(&str, usize)]) -> Groups {
        let mut target = Groups::default();
        for (group, count) in groups {
            let names = (0..*count).map(|i| format!("{group}_{i}")).collect();
            target.motions.insert(group.to_string(), names);
        }
        target
    }

    #[test]
    fn test_first_group_wins() {
        let target = with_groups(&[("TapBody", 3), ("Idle", 2)]);
        let mut selector = MotionSelector::new(vec!["TapBody".into(), "Idle".into()], Some(7));

        for _ in 0..20 {
            let choice = selector.pick_motion(&target).unwrap();
            assert_eq!(choice.group, "TapBody");
            assert!(choice.index < 3);
            assert_eq!(choice.name, format!("TapBody_{}", choice.index));
        }
    }

    #[test]
    fn test_falls_back_to_idle() {
        let target = with_groups(&[("TapBody", 0), ("Idle", 2)]);
        let mut selector = MotionSelector::new(vec!["TapBody".into(), "Idle".into()], Some(1));
        assert_eq!(selector.pick_motion(&target).unwrap().group, "Idle");
    }

    #[test]
    fn test_no_motions_anywhere() {
        let target = Groups::default();
        let mut selector = MotionSelector::default();
        assert!(selector.pick_motion(&target).is_none());
        assert!(selector.pick_expression(&target).is_none());
    }

    #[test]
    fn test_all_motions_reachable() {
        let target = with_groups(&[("TapBody", 4)]);
        let mut selector = MotionSelector::new(vec!["TapBody".into()], Some(42));
        let mut seen = [false; 4];
        for _ in 0..200 {
            seen[selector.pick_motion(&target).unwrap().index] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_seed_is_repeatable() {
        let mut target = with_groups(&[("TapBody", 10)]);
        target.expressions = (0..5).map(|i| format!("exp_{i}")).collect();

        let mut a = MotionSelector::new(vec!["TapBody".into()], Some(9));
        let mut b = MotionSelector::new(vec!["TapBody".into()], Some(9));
        for _ in 0..10 {
            assert_eq!(a.pick_motion(&target), b.pick_motion(&target));
            assert_eq!(a.pick_expression(&target), b.pick_expression(&target));
        }
    }
}
