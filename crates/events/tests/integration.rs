//! Integration tests for events

#[cfg(test)]
mod tests {
    use kiln_errors::GraphError;
    use kiln_events::*;

    #[tokio::test]
    async fn test_event_sender_ext() {
        let (tx, mut rx) = channel();

        tx.emit_error("test error");
        tx.emit_debug("test debug");

        let first = rx.recv().await.unwrap();
        assert!(matches!(
            first.event,
            AppEvent::General(GeneralEvent::Error { .. })
        ));
        assert_eq!(first.meta.level, EventLevel::Error);
        assert_eq!(first.meta.source, EventSource::GENERAL);

        let second = rx.recv().await.unwrap();
        assert!(matches!(
            second.event,
            AppEvent::General(GeneralEvent::DebugLog { .. })
        ));
    }

    #[tokio::test]
    async fn test_dropped_receiver() {
        let (tx, rx) = channel();
        drop(rx);

        // Should not panic when receiver is dropped
        tx.emit_warning("ignored");
    }

    #[test]
    fn test_failure_context_from_error() {
        let err = GraphError::MissingBinaries {
            packages: vec!["zlib/1.3:abc".into()],
        };
        let failure = FailureContext::from_error(&err);
        assert_eq!(failure.code.as_deref(), Some("graph.missing_binaries"));
        assert!(failure.hint.is_some());
        assert!(!failure.retryable);
    }

    #[test]
    fn test_event_serialization_shape() {
        let event = AppEvent::Resolver(ResolverEvent::conflict_detected(
            "zlib", "zlib/1.2", "zlib/1.3",
        ));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["domain"], "resolver");
        assert_eq!(json["event"]["type"], "ConflictDetected");
        assert_eq!(event.log_level(), tracing::Level::WARN);
        assert_eq!(event.log_target(), "kiln::events::resolver");
    }
}
