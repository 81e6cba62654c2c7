//! Per-session breakpoint registry.
//!
//! The manager owns the session's [`Breakpoint`] records and the mapping from
//! local ids to the ids the target assigned. Conditions are wrapped with
//! [`guard_condition`] before they reach the target, so a condition that throws
//! still pauses and the error can be reported instead of silently skipping the
//! breakpoint.
//!
//! The target may report a resolution or a hit for a breakpoint before the
//! reply that assigns its id has been processed. Resolutions for unknown ids
//! are buffered while a placement is in flight and applied when the id is
//! bound; [`BreakpointManager::settled`] lets the event pump hold hit
//! classification until no placement is outstanding.

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info};

use inspect_debug_core::{Breakpoint, BreakpointId, Error, Result, SourceLocation};
use inspect_debug_protocol::{guard_condition, BreakpointPlacement, InspectorClient};

#[derive(Debug)]
struct Entry {
    breakpoint: Breakpoint,
    /// Id assigned by the target while the breakpoint is bound
    protocol_id: Option<String>,
}

#[derive(Debug, Default)]
struct Registry {
    next_id: u32,
    entries: BTreeMap<BreakpointId, Entry>,
    by_protocol: HashMap<String, BreakpointId>,
    /// Resolutions that arrived before their id was bound
    early_resolutions: HashMap<String, SourceLocation>,
}

impl Registry {
    fn bind(&mut self, id: BreakpointId, placement: BreakpointPlacement) -> Option<Breakpoint> {
        let early = self.early_resolutions.remove(&placement.protocol_id);
        let entry = self.entries.get_mut(&id)?;
        entry.breakpoint.verified = !placement.locations.is_empty() || early.is_some();
        entry.breakpoint.resolved_location = placement.locations.into_iter().next().or(early);
        self.by_protocol.insert(placement.protocol_id.clone(), id);
        entry.protocol_id = Some(placement.protocol_id);
        Some(entry.breakpoint.clone())
    }

    fn unbind(&mut self, id: BreakpointId) {
        if let Some(protocol_id) = self
            .entries
            .get_mut(&id)
            .and_then(|entry| entry.protocol_id.take())
        {
            self.by_protocol.remove(&protocol_id);
        }
    }
}

/// Breakpoints hit by one pause, split by whether they should surface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BreakpointHits {
    /// Enabled, verified breakpoints; their hit counts were incremented
    pub active: Vec<BreakpointId>,
    /// Known breakpoints that are disabled or not yet verified
    pub inactive: Vec<BreakpointId>,
    /// Target ids with no local record
    pub unknown: Vec<String>,
}

impl BreakpointHits {
    /// Whether nothing that should stop the session was hit.
    pub fn is_silent(&self) -> bool {
        self.active.is_empty()
    }
}

/// Counts one placement as in flight until dropped.
struct Placement<'a> {
    manager: &'a BreakpointManager,
}

impl Drop for Placement<'_> {
    fn drop(&mut self) {
        self.manager.in_flight.send_modify(|n| *n = n.saturating_sub(1));
        let mut registry = self.manager.registry.lock();
        if *self.manager.in_flight.borrow() == 0 {
            registry.early_resolutions.clear();
        }
    }
}

/// Owns the breakpoints of one session.
#[derive(Debug)]
pub struct BreakpointManager {
    registry: Mutex<Registry>,
    in_flight: watch::Sender<usize>,
}

impl Default for BreakpointManager {
    fn default() -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            in_flight: watch::Sender::new(0),
        }
    }
}

impl BreakpointManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    fn begin_placement(&self) -> Placement<'_> {
        self.in_flight.send_modify(|n| *n += 1);
        Placement { manager: self }
    }

    /// Wait until no placement is awaiting the target's reply.
    pub async fn settled(&self) {
        let mut rx = self.in_flight.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Place a breakpoint at a 1-based `line` of `file`.
    ///
    /// The returned record is verified when the target already bound it to
    /// loaded code; otherwise it stays unverified until a resolution arrives
    /// through [`BreakpointManager::mark_resolved`].
    pub async fn set(
        &self,
        client: &InspectorClient,
        file: &str,
        line: u32,
        condition: Option<String>,
    ) -> Result<Breakpoint> {
        let guarded = condition.as_deref().map(guard_condition);
        let _pending = self.begin_placement();
        let placement = client.set_breakpoint(file, line, guarded.as_deref()).await?;

        let mut registry = self.registry.lock();
        registry.next_id += 1;
        let id = BreakpointId::new(registry.next_id);
        registry.entries.insert(
            id,
            Entry {
                breakpoint: Breakpoint {
                    id,
                    file: file.to_string(),
                    line,
                    condition,
                    verified: false,
                    enabled: true,
                    resolved_location: None,
                    hit_count: 0,
                },
                protocol_id: None,
            },
        );
        let breakpoint = registry
            .bind(id, placement)
            .ok_or(Error::BreakpointNotFound(id))?;

        info!(
            "Set breakpoint {} at {}:{} (verified: {})",
            id, file, line, breakpoint.verified
        );
        Ok(breakpoint)
    }

    /// Remove a breakpoint from the target and from the registry.
    pub async fn remove(&self, client: &InspectorClient, id: BreakpointId) -> Result<()> {
        let protocol_id = {
            let registry = self.registry.lock();
            let entry = registry
                .entries
                .get(&id)
                .ok_or(Error::BreakpointNotFound(id))?;
            entry.protocol_id.clone()
        };

        if let Some(protocol_id) = protocol_id {
            client.remove_breakpoint(&protocol_id).await?;
        }

        let mut registry = self.registry.lock();
        registry.unbind(id);
        registry.entries.remove(&id);
        info!("Removed breakpoint {}", id);
        Ok(())
    }

    /// Enable or disable a breakpoint.
    ///
    /// Disabling removes it from the target but keeps the record; enabling
    /// places it again and re-verifies it.
    pub async fn toggle(
        &self,
        client: &InspectorClient,
        id: BreakpointId,
        enabled: bool,
    ) -> Result<Breakpoint> {
        let (current, protocol_id) = {
            let registry = self.registry.lock();
            let entry = registry
                .entries
                .get(&id)
                .ok_or(Error::BreakpointNotFound(id))?;
            (entry.breakpoint.clone(), entry.protocol_id.clone())
        };
        if current.enabled == enabled {
            return Ok(current);
        }

        if enabled {
            let guarded = current.condition.as_deref().map(guard_condition);
            let _pending = self.begin_placement();
            let placement = client
                .set_breakpoint(&current.file, current.line, guarded.as_deref())
                .await?;
            let mut registry = self.registry.lock();
            if let Some(entry) = registry.entries.get_mut(&id) {
                entry.breakpoint.enabled = true;
            }
            let breakpoint = registry
                .bind(id, placement)
                .ok_or(Error::BreakpointNotFound(id))?;
            debug!("Enabled breakpoint {}", id);
            Ok(breakpoint)
        } else {
            if let Some(protocol_id) = protocol_id {
                client.remove_breakpoint(&protocol_id).await?;
            }
            let mut registry = self.registry.lock();
            registry.unbind(id);
            let entry = registry
                .entries
                .get_mut(&id)
                .ok_or(Error::BreakpointNotFound(id))?;
            entry.breakpoint.enabled = false;
            entry.breakpoint.verified = false;
            debug!("Disabled breakpoint {}", id);
            Ok(entry.breakpoint.clone())
        }
    }

    /// Record a late resolution reported by the target.
    ///
    /// Returns the breakpoint when this resolution verified it.
    pub fn mark_resolved(&self, protocol_id: &str, location: SourceLocation) -> Option<Breakpoint> {
        let mut registry = self.registry.lock();
        let Some(id) = registry.by_protocol.get(protocol_id).copied() else {
            if *self.in_flight.borrow() > 0 {
                debug!("Buffering resolution of unbound breakpoint {}", protocol_id);
                registry
                    .early_resolutions
                    .insert(protocol_id.to_string(), location);
            }
            return None;
        };
        let entry = registry.entries.get_mut(&id)?;
        if entry.breakpoint.resolved_location.is_none() {
            entry.breakpoint.resolved_location = Some(location);
        }
        if entry.breakpoint.verified {
            return None;
        }
        entry.breakpoint.verified = true;
        info!("Breakpoint {} verified", id);
        Some(entry.breakpoint.clone())
    }

    /// Classify the target ids reported by a pause.
    ///
    /// Hit counts of active breakpoints are incremented.
    pub fn resolve_hits(&self, protocol_ids: &[String]) -> BreakpointHits {
        let mut registry = self.registry.lock();
        let mut hits = BreakpointHits::default();
        for protocol_id in protocol_ids {
            let Some(id) = registry.by_protocol.get(protocol_id).copied() else {
                hits.unknown.push(protocol_id.clone());
                continue;
            };
            match registry.entries.get_mut(&id) {
                Some(entry) if entry.breakpoint.enabled && entry.breakpoint.verified => {
                    entry.breakpoint.hit_count += 1;
                    hits.active.push(id);
                }
                Some(_) => hits.inactive.push(id),
                None => hits.unknown.push(protocol_id.clone()),
            }
        }
        hits
    }

    /// Look up a breakpoint.
    pub fn get(&self, id: BreakpointId) -> Option<Breakpoint> {
        self.registry
            .lock()
            .entries
            .get(&id)
            .map(|entry| entry.breakpoint.clone())
    }

    /// All breakpoints in creation order.
    pub fn list(&self) -> Vec<Breakpoint> {
        self.registry
            .lock()
            .entries
            .values()
            .map(|entry| entry.breakpoint.clone())
            .collect()
    }

    /// Number of breakpoints.
    pub fn len(&self) -> usize {
        self.registry.lock().entries.len()
    }

    /// Whether no breakpoints exist.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inspect_debug_protocol::mock::{MockInspector, MockInspectorConfig, MockScript};
    use inspect_debug_protocol::TransportConfig;

    const MAIN: &str = "file:///app/main.js";

    async fn connect() -> (MockInspector, InspectorClient) {
        let mock = MockInspector::spawn(
            MockInspectorConfig::default().with_script(MockScript::new("1", MAIN, [0, 1, 2, 4])),
        )
        .await
        .unwrap();
        let client = InspectorClient::connect(&mock.endpoint(), TransportConfig::default())
            .await
            .unwrap();
        client.enable().await.unwrap();
        (mock, client)
    }

    #[tokio::test]
    async fn test_set_verified_breakpoint() {
        let (mock, client) = connect().await;
        let manager = BreakpointManager::new();

        let bp = manager.set(&client, "/app/main.js", 3, None).await.unwrap();
        assert_eq!(bp.id, BreakpointId::new(1));
        assert!(bp.verified);
        assert!(bp.enabled);
        assert_eq!(bp.resolved_location.unwrap().line, 3);
        assert_eq!(mock.breakpoint_count(), 1);
    }

    #[tokio::test]
    async fn test_set_unverified_breakpoint() {
        let (_mock, client) = connect().await;
        let manager = BreakpointManager::new();

        let bp = manager.set(&client, "/app/main.js", 4, None).await.unwrap();
        assert!(!bp.verified);
        assert!(bp.resolved_location.is_none());
    }

    #[tokio::test]
    async fn test_ids_are_unique_and_listed_in_order() {
        let (_mock, client) = connect().await;
        let manager = BreakpointManager::new();

        let a = manager.set(&client, "/app/main.js", 1, None).await.unwrap();
        let b = manager.set(&client, "/app/main.js", 2, None).await.unwrap();
        assert_ne!(a.id, b.id);

        let listed: Vec<_> = manager.list().into_iter().map(|bp| bp.id).collect();
        assert_eq!(listed, vec![a.id, b.id]);
        assert_eq!(manager.len(), 2);
    }

    #[tokio::test]
    async fn test_remove_breakpoint() {
        let (mock, client) = connect().await;
        let manager = BreakpointManager::new();

        let bp = manager.set(&client, "/app/main.js", 1, None).await.unwrap();
        manager.remove(&client, bp.id).await.unwrap();
        assert!(manager.is_empty());
        assert_eq!(mock.breakpoint_count(), 0);

        let err = manager.remove(&client, bp.id).await.unwrap_err();
        assert!(matches!(err, Error::BreakpointNotFound(_)));
    }

    #[tokio::test]
    async fn test_toggle_keeps_record() {
        let (mock, client) = connect().await;
        let manager = BreakpointManager::new();
        let bp = manager.set(&client, "/app/main.js", 1, None).await.unwrap();

        let disabled = manager.toggle(&client, bp.id, false).await.unwrap();
        assert!(!disabled.enabled);
        assert_eq!(mock.breakpoint_count(), 0);
        assert_eq!(manager.len(), 1);

        let enabled = manager.toggle(&client, bp.id, true).await.unwrap();
        assert!(enabled.enabled);
        assert!(enabled.verified);
        assert_eq!(mock.breakpoint_count(), 1);
    }

    #[tokio::test]
    async fn test_condition_is_guarded_on_the_wire() {
        let (_mock, client) = connect().await;
        let manager = BreakpointManager::new();

        let bp = manager
            .set(&client, "/app/main.js", 1, Some("x > 1".to_string()))
            .await
            .unwrap();
        assert_eq!(bp.condition.as_deref(), Some("x > 1"));
    }

    #[tokio::test]
    async fn test_resolve_hits_classifies_ids() {
        let (_mock, client) = connect().await;
        let manager = BreakpointManager::new();
        let active = manager.set(&client, "/app/main.js", 1, None).await.unwrap();
        let pending = manager.set(&client, "/app/main.js", 4, None).await.unwrap();

        let hits = manager.resolve_hits(&[
            "0:0:0:file:///app/main.js".to_string(),
            "3:0:0:file:///app/main.js".to_string(),
            "nope".to_string(),
        ]);
        assert_eq!(hits.active, vec![active.id]);
        assert_eq!(hits.inactive, vec![pending.id]);
        assert_eq!(hits.unknown, vec!["nope".to_string()]);
        assert_eq!(manager.get(active.id).unwrap().hit_count, 1);
        assert_eq!(manager.get(pending.id).unwrap().hit_count, 0);
    }

    #[tokio::test]
    async fn test_mark_resolved_verifies_once() {
        let (_mock, client) = connect().await;
        let manager = BreakpointManager::new();
        let bp = manager.set(&client, "/app/main.js", 4, None).await.unwrap();
        let location = SourceLocation::new("/app/main.js", 4, 1);

        let verified = manager
            .mark_resolved("3:0:0:file:///app/main.js", location.clone())
            .unwrap();
        assert_eq!(verified.id, bp.id);
        assert_eq!(verified.resolved_location, Some(location.clone()));
        assert!(manager
            .mark_resolved("3:0:0:file:///app/main.js", location)
            .is_none());
        assert!(manager.mark_resolved("unknown", SourceLocation::new("x", 1, 1)).is_none());
    }

    #[tokio::test]
    async fn test_resolution_before_bind_is_applied() {
        let (_mock, client) = connect().await;
        let manager = BreakpointManager::new();
        let location = SourceLocation::new("/app/main.js", 4, 1);

        let outstanding = manager.begin_placement();
        assert!(manager
            .mark_resolved("3:0:0:file:///app/main.js", location.clone())
            .is_none());

        let bp = manager.set(&client, "/app/main.js", 4, None).await.unwrap();
        assert!(bp.verified);
        assert_eq!(bp.resolved_location, Some(location));
        drop(outstanding);

        let hits = manager.resolve_hits(&["3:0:0:file:///app/main.js".to_string()]);
        assert_eq!(hits.active, vec![bp.id]);
    }

    #[tokio::test]
    async fn test_resolution_without_placement_is_dropped() {
        let (_mock, client) = connect().await;
        let manager = BreakpointManager::new();

        manager.mark_resolved(
            "3:0:0:file:///app/main.js",
            SourceLocation::new("/app/main.js", 4, 1),
        );
        let bp = manager.set(&client, "/app/main.js", 4, None).await.unwrap();
        assert!(!bp.verified);
    }

    #[tokio::test]
    async fn test_settled_waits_for_outstanding_placement() {
        let manager = std::sync::Arc::new(BreakpointManager::new());
        manager.settled().await;

        let outstanding = manager.begin_placement();
        let waiter = {
            let manager = std::sync::Arc::clone(&manager);
            tokio::spawn(async move { manager.settled().await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(outstanding);
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_zero_line_is_rejected() {
        let (_mock, client) = connect().await;
        let manager = BreakpointManager::new();

        let err = manager.set(&client, "/app/main.js", 0, None).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(manager.is_empty());
    }
}
