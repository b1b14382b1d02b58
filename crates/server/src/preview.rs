//! Path preview and listing.
//!
//! The command layer asks for a preview by id. The id is checked against the
//! registry first; a missing id surfaces as `UnknownResource` and nothing is
//! sent. Otherwise the current record and a SHA-256 of its geometry are
//! stamped into a `PreviewPathProto` and handed to the transport.

use std::sync::Arc;

use keyframe_sim::PlayerId;
use keyframe_wire::{PathListProto, PreviewPathProto, ResourceRecord, ResourceRecordProto};
use prost::Message;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{ServerError, ServerResult};
use crate::registry::ResourceRegistry;

/// Transport collaborator that delivers encoded messages to one client.
pub trait PreviewSink: Send + Sync {
    fn send_preview(&self, viewer: PlayerId, payload: Vec<u8>);
}

/// SHA-256 of path geometry.
pub fn geometry_digest(geometry: &[u8]) -> [u8; 32] {
    Sha256::digest(geometry).into()
}

/// Preview/list front end over the registry.
pub struct PreviewService<S> {
    registry: Arc<ResourceRegistry>,
    sink: S,
}

impl<S: PreviewSink> PreviewService<S> {
    pub fn new(registry: Arc<ResourceRegistry>, sink: S) -> Self {
        Self { registry, sink }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Build the preview instruction for `id` without sending it.
    pub fn build_preview(&self, id: &str) -> ServerResult<PreviewPathProto> {
        let (record, geometry) = self
            .registry
            .get_with_geometry(id)
            .ok_or_else(|| ServerError::UnknownResource(id.to_string()))?;

        Ok(PreviewPathProto {
            record: Some((&record).into()),
            geometry_sha256: geometry_digest(&geometry).to_vec(),
            geometry: geometry.to_vec(),
        })
    }

    /// Send a preview of `id` to `viewer`. Returns the record that was sent.
    pub fn preview(&self, viewer: PlayerId, id: &str) -> ServerResult<ResourceRecord> {
        let message = match self.build_preview(id) {
            Ok(message) => message,
            Err(e) => {
                warn!(%viewer, id, "preview rejected: {e}");
                return Err(e);
            }
        };
        let record = message.resource_record()?;
        debug!(%viewer, id, version = record.version, "sending path preview");
        self.sink.send_preview(viewer, message.encode_to_vec());
        Ok(record)
    }

    /// Published records ordered by id.
    pub fn list(&self) -> PathListProto {
        PathListProto {
            records: self
                .registry
                .list_records()
                .iter()
                .map(ResourceRecordProto::from)
                .collect(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Sink that keeps everything it is asked to send.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingSink {
        pub(crate) sent: Mutex<Vec<(PlayerId, Vec<u8>)>>,
    }

    impl PreviewSink for RecordingSink {
        fn send_preview(&self, viewer: PlayerId, payload: Vec<u8>) {
            self.sent.lock().unwrap().push((viewer, payload));
        }
    }

    fn viewer() -> PlayerId {
        PlayerId::from_u128(42)
    }

    #[test]
    fn test_preview_unknown_id_sends_nothing() {
        let service = PreviewService::new(Arc::new(ResourceRegistry::new()), RecordingSink::default());
        let err = service.preview(viewer(), "ghost").unwrap_err();
        assert!(matches!(err, ServerError::UnknownResource(ref id) if id == "ghost"));
        assert_eq!(err.to_string(), "no camera path named 'ghost'");
        assert!(service.sink().sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_preview_stamps_current_version() {
        let registry = Arc::new(ResourceRegistry::new());
        let author = PlayerId::from_u128(7);
        registry
            .publish_with_geometry("intro", author, b"geometry-v1".to_vec())
            .unwrap();
        registry.publish("intro", author).unwrap();

        let service = PreviewService::new(Arc::clone(&registry), RecordingSink::default());
        let record = service.preview(viewer(), "intro").unwrap();
        assert_eq!(record, ResourceRecord::new("intro", 2, author));

        let sent = service.sink().sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, viewer());

        let message = PreviewPathProto::decode(sent[0].1.as_slice()).unwrap();
        assert_eq!(message.resource_record().unwrap(), record);
        assert_eq!(message.geometry, b"geometry-v1");
        assert_eq!(
            message.geometry_sha256,
            geometry_digest(b"geometry-v1").to_vec()
        );
    }

    #[test]
    fn test_geometry_digest_detects_change() {
        assert_eq!(geometry_digest(b"a"), geometry_digest(b"a"));
        assert_ne!(geometry_digest(b"a"), geometry_digest(b"b"));
    }

    #[test]
    fn test_list_ordered() {
        let registry = Arc::new(ResourceRegistry::new());
        let author = PlayerId::from_u128(7);
        registry.publish("outro", author).unwrap();
        registry.publish("intro", author).unwrap();

        let service = PreviewService::new(registry, RecordingSink::default());
        let ids: Vec<_> = service.list().records.into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["intro", "outro"]);
    }
}
