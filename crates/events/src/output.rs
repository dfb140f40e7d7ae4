//! Scoped output handle for recipe hooks

use crate::{AppEvent, EventEmitter, EventLevel, EventMeta, EventSender, RecipeEvent};

/// Output handle bound to one graph node
///
/// Every event emitted through the handle carries the node reference as
/// its correlation id. A handle without a sender drops output silently.
#[derive(Debug, Clone)]
pub struct NodeOutput {
    scope: String,
    sender: Option<EventSender>,
}

impl NodeOutput {
    pub fn new(scope: impl Into<String>, sender: Option<EventSender>) -> Self {
        Self {
            scope: scope.into(),
            sender,
        }
    }

    /// Handle that discards everything
    pub fn silent(scope: impl Into<String>) -> Self {
        Self::new(scope, None)
    }

    /// The node reference this handle writes for
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    fn write(&self, level: EventLevel, message: impl Into<String>) {
        self.emit(AppEvent::Recipe(RecipeEvent::output(
            self.scope.clone(),
            level,
            message,
        )));
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.write(EventLevel::Debug, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.write(EventLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.write(EventLevel::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.write(EventLevel::Error, message);
    }

    /// Announce that a hook is about to run
    pub fn hook_started(&self, hook: &str) {
        self.emit(AppEvent::Recipe(RecipeEvent::HookStarted {
            scope: self.scope.clone(),
            hook: hook.to_string(),
        }));
    }
}

impl EventEmitter for NodeOutput {
    fn event_sender(&self) -> Option<&EventSender> {
        self.sender.as_ref()
    }

    fn enrich_event_meta(&self, _event: &AppEvent, meta: &mut EventMeta) {
        meta.correlation_id = Some(self.scope.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel;

    #[tokio::test]
    async fn test_output_is_tagged_with_scope() {
        let (tx, mut rx) = channel();
        let zlib = NodeOutput::new("zlib/1.3", Some(tx.clone()));
        let fmt = NodeOutput::new("fmt/10.1", Some(tx));

        zlib.info("configuring");
        fmt.warn("deprecated option");
        zlib.emit_debug("general event through the node handle");

        let first = rx.recv().await.unwrap();
        assert_eq!(first.meta.correlation_id.as_deref(), Some("zlib/1.3"));
        assert!(matches!(
            first.event,
            AppEvent::Recipe(RecipeEvent::Output { ref scope, .. }) if scope == "zlib/1.3"
        ));

        let second = rx.recv().await.unwrap();
        assert_eq!(second.meta.correlation_id.as_deref(), Some("fmt/10.1"));
        assert_eq!(second.meta.level, EventLevel::Warn);

        let third = rx.recv().await.unwrap();
        assert_eq!(third.meta.correlation_id.as_deref(), Some("zlib/1.3"));
    }

    #[test]
    fn test_silent_handle_drops_output() {
        let output = NodeOutput::silent("pkg/1.0");
        output.info("nobody listens");
        assert_eq!(output.scope(), "pkg/1.0");
    }
}
