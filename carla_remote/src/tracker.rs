//! Request/response correlation and rollback of optimistic writes.

use crate::store::{EntityStore, ParameterUpdate, PatchbayConnection, RemovedPlugin};
use carla_protocol::{Command, CorrelationId, ParamId, PluginId};
use std::collections::BTreeMap;
use tracing::warn;

/// What has to be written back if the host rejects a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    /// The command had no optimistic effect.
    Nothing,
    ParameterValue {
        plugin: PluginId,
        param: ParamId,
        prior: Option<f32>,
    },
    RemovedPlugin(RemovedPlugin),
    RemovedConnection(PatchbayConnection),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingMutation {
    pub id: CorrelationId,
    pub command: Command,
    pub snapshot: Snapshot,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Confirmed(PendingMutation),
    RolledBack {
        mutation: PendingMutation,
        error: String,
    },
    Unknown {
        id: CorrelationId,
        error: Option<String>,
    },
}

#[derive(Debug)]
pub struct MutationTracker {
    /// `None` once every positive `i32` has been handed out.
    next_id: Option<i32>,
    pending: BTreeMap<CorrelationId, PendingMutation>,
}

impl Default for MutationTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl MutationTracker {
    pub fn new() -> Self {
        Self {
            next_id: Some(1),
            pending: BTreeMap::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn starting_at(next_id: i32) -> Self {
        Self {
            next_id: Some(next_id),
            pending: BTreeMap::new(),
        }
    }

    /// Hands out the next correlation id. Ids are never reused, so this
    /// returns `None` for good once the counter passes `i32::MAX`.
    pub fn allocate(&mut self) -> Option<CorrelationId> {
        let id = self.next_id?;
        self.next_id = id.checked_add(1);
        Some(CorrelationId(id))
    }

    /// Records a mutation under an id obtained from [`allocate`](Self::allocate).
    pub fn track(&mut self, id: CorrelationId, command: Command, snapshot: Snapshot) {
        self.pending.insert(
            id,
            PendingMutation {
                id,
                command,
                snapshot,
            },
        );
    }

    pub fn register(&mut self, command: Command, snapshot: Snapshot) -> Option<CorrelationId> {
        let id = self.allocate()?;
        self.track(id, command, snapshot);
        Some(id)
    }

    pub fn get(&self, id: CorrelationId) -> Option<&PendingMutation> {
        self.pending.get(&id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Settles a host response. An empty or missing error confirms the
    /// optimistic state; anything else undoes it. Unknown ids touch nothing.
    pub fn resolve(
        &mut self,
        id: CorrelationId,
        error: Option<&str>,
        store: &mut EntityStore,
    ) -> Resolution {
        let Some(mutation) = self.pending.remove(&id) else {
            warn!(%id, ?error, "response for unknown correlation id");
            return Resolution::Unknown {
                id,
                error: error.map(str::to_string),
            };
        };

        match error.filter(|e| !e.is_empty()) {
            None => Resolution::Confirmed(mutation),
            Some(error) => {
                warn!(%id, command = mutation.command.name(), error, "host rejected command, rolling back");
                undo(&mutation.snapshot, store);
                Resolution::RolledBack {
                    mutation,
                    error: error.to_string(),
                }
            }
        }
    }

    /// Reverts and forgets a mutation whose message never left the client.
    pub fn rollback(&mut self, id: CorrelationId, store: &mut EntityStore) -> Option<PendingMutation> {
        let mutation = self.pending.remove(&id)?;
        undo(&mutation.snapshot, store);
        Some(mutation)
    }

    /// Drops every pending record. The id counter keeps counting.
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }
}

fn undo(snapshot: &Snapshot, store: &mut EntityStore) {
    match snapshot {
        Snapshot::Nothing => {}
        Snapshot::ParameterValue {
            plugin,
            param,
            prior: Some(v),
        } => store.merge_parameter(*plugin, *param, &ParameterUpdate::Value(*v)),
        Snapshot::ParameterValue {
            plugin,
            param,
            prior: None,
        } => store.clear_parameter_value(*plugin, *param),
        Snapshot::RemovedPlugin(removed) => store.restore_plugin(removed.clone()),
        Snapshot::RemovedConnection(connection) => {
            store.insert_connection(connection.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carla_protocol::PluginDescriptor;

    fn set_value(plugin: u32, param: u32, value: f32) -> Command {
        Command::SetParameterValue {
            plugin: PluginId(plugin),
            param: ParamId(param),
            value,
        }
    }

    #[test]
    fn ids_are_monotonic_and_survive_clear() {
        let mut tracker = MutationTracker::new();
        let a = tracker.register(Command::RefreshPatchbay, Snapshot::Nothing).unwrap();
        let b = tracker.register(Command::RefreshPatchbay, Snapshot::Nothing).unwrap();
        assert_eq!(a, CorrelationId(1));
        assert!(b > a);
        assert_eq!(tracker.clear(), 2);
        let c = tracker.register(Command::RefreshPatchbay, Snapshot::Nothing).unwrap();
        assert!(c > b);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn exhausted_counter_never_wraps_onto_a_pending_id() {
        let mut tracker = MutationTracker::starting_at(1);
        let first = tracker.register(Command::RefreshPatchbay, Snapshot::Nothing).unwrap();
        tracker.next_id = Some(i32::MAX);

        let last = tracker
            .register(Command::AddPlugin { identifier: "a".into() }, Snapshot::Nothing)
            .unwrap();
        assert_eq!(last, CorrelationId(i32::MAX));
        assert_eq!(
            tracker.register(Command::AddPlugin { identifier: "b".into() }, Snapshot::Nothing),
            None
        );
        assert_eq!(tracker.allocate(), None);

        assert_eq!(tracker.len(), 2);
        assert_eq!(tracker.get(first).unwrap().command, Command::RefreshPatchbay);
    }

    #[test]
    fn success_keeps_optimistic_value() {
        let mut store = EntityStore::new();
        store.merge_parameter(PluginId(1), ParamId(0), &ParameterUpdate::Value(0.9));
        let mut tracker = MutationTracker::new();
        let id = tracker.register(
            set_value(1, 0, 0.9),
            Snapshot::ParameterValue {
                plugin: PluginId(1),
                param: ParamId(0),
                prior: Some(0.1),
            },
        ).unwrap();

        assert!(matches!(tracker.resolve(id, Some(""), &mut store), Resolution::Confirmed(_)));
        assert_eq!(store.parameter(PluginId(1), ParamId(0)).unwrap().value, Some(0.9));
        assert!(tracker.is_empty());
    }

    #[test]
    fn error_restores_prior_value_or_clears_it() {
        let mut store = EntityStore::new();
        store.merge_parameter(PluginId(1), ParamId(0), &ParameterUpdate::Value(0.9));
        store.merge_parameter(PluginId(1), ParamId(1), &ParameterUpdate::Value(0.9));
        let mut tracker = MutationTracker::new();
        let restore = tracker.register(
            set_value(1, 0, 0.9),
            Snapshot::ParameterValue {
                plugin: PluginId(1),
                param: ParamId(0),
                prior: Some(0.1),
            },
        ).unwrap();
        let clear = tracker.register(
            set_value(1, 1, 0.9),
            Snapshot::ParameterValue {
                plugin: PluginId(1),
                param: ParamId(1),
                prior: None,
            },
        ).unwrap();

        let r = tracker.resolve(restore, Some("out of range"), &mut store);
        assert!(matches!(r, Resolution::RolledBack { ref error, .. } if error == "out of range"));
        tracker.resolve(clear, Some("nope"), &mut store);

        assert_eq!(store.parameter(PluginId(1), ParamId(0)).unwrap().value, Some(0.1));
        assert_eq!(store.parameter(PluginId(1), ParamId(1)).unwrap().value, None);
    }

    #[test]
    fn error_restores_removed_plugin() {
        let mut store = EntityStore::new();
        store.upsert_descriptor(&PluginDescriptor {
            plugin: PluginId(5),
            name: "mda Delay".into(),
            ..PluginDescriptor::default()
        });
        store.merge_parameter(PluginId(5), ParamId(0), &ParameterUpdate::Value(0.5));
        let removed = store.remove_plugin(PluginId(5)).unwrap();

        let mut tracker = MutationTracker::new();
        let id = tracker.register(
            Command::RemovePlugin { plugin: PluginId(5) },
            Snapshot::RemovedPlugin(removed),
        ).unwrap();
        tracker.resolve(id, Some("plugin is busy"), &mut store);

        assert_eq!(store.plugin(PluginId(5)).unwrap().name, "mda Delay");
        assert_eq!(store.parameters_of(PluginId(5)).count(), 1);
    }

    #[test]
    fn unknown_id_never_touches_the_store() {
        let mut store = EntityStore::new();
        store.merge_parameter(PluginId(1), ParamId(0), &ParameterUpdate::Value(0.5));
        let before = store.snapshot();
        let mut tracker = MutationTracker::new();

        let r = tracker.resolve(CorrelationId(77), Some("late"), &mut store);
        assert_eq!(
            r,
            Resolution::Unknown {
                id: CorrelationId(77),
                error: Some("late".into())
            }
        );
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn duplicate_response_is_unknown_the_second_time() {
        let mut store = EntityStore::new();
        let mut tracker = MutationTracker::new();
        let id = tracker.register(Command::RefreshPatchbay, Snapshot::Nothing).unwrap();
        assert!(matches!(tracker.resolve(id, None, &mut store), Resolution::Confirmed(_)));
        assert!(matches!(tracker.resolve(id, None, &mut store), Resolution::Unknown { .. }));
    }
}
