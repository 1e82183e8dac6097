use crate::pomdp::Pomdp;
use crate::types::{Action, Observation};

/// One action and the observation that followed it
#[derive(Clone, Debug, PartialEq)]
pub struct Interaction {
    pub action: Action,
    pub observation: Observation,
}

/// Interactions of a single episode, in order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct History {
    interactions: Vec<Interaction>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, action: Action, observation: Observation) {
        self.interactions.push(Interaction { action, observation });
    }

    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }

    pub fn get(&self, step: usize) -> &Interaction {
        &self.interactions[step]
    }

    pub fn last(&self) -> Option<&Interaction> {
        self.interactions.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Interaction> {
        self.interactions.iter()
    }

    /// Returns every action and observation to `domain`
    pub fn clear<D: Pomdp>(&mut self, domain: &D) {
        for step in self.interactions.drain(..) {
            domain.release_action(step.action);
            domain.release_observation(step.observation);
        }
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = &'a Interaction;
    type IntoIter = std::slice::Iter<'a, Interaction>;

    fn into_iter(self) -> Self::IntoIter {
        self.interactions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_order() {
        let mut history = History::new();
        assert!(history.is_empty());

        history.add(Action(1), Observation::single(0));
        history.add(Action(0), Observation::single(1));

        assert_eq!(history.len(), 2);
        assert_eq!(history.get(0).action, Action(1));
        assert_eq!(history.last().map(|i| i.observation.clone()), Some(Observation::single(1)));

        let actions: Vec<Action> = history.iter().map(|i| i.action).collect();
        assert_eq!(actions, vec![Action(1), Action(0)]);
    }
}
