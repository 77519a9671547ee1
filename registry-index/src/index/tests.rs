//! Tests for the image index merger and retriever

#[cfg(test)]
mod index_tests {
    use crate::error::AppError;
    use crate::events::{BroadcastSink, EventKind};
    use crate::index::*;
    use crate::platform::PlatformTag;
    use crate::search::UpstreamSource;
    use crate::store::{image_json_path, index_images_path, ContentStore, MemoryStore};
    use crate::types::{ImageRecord, Repository, SearchResultEntry};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn repo() -> Repository {
        Repository::parse("acme/web").unwrap()
    }

    fn records(value: Value) -> Vec<ImageRecord> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|v| record_from_value(v).unwrap())
            .collect()
    }

    fn create_merger() -> (ImageIndexMerger, Arc<MemoryStore>, Arc<BroadcastSink>) {
        let store = Arc::new(MemoryStore::new());
        let events = Arc::new(BroadcastSink::new(16));
        let merger = ImageIndexMerger::new(store.clone(), events.clone());
        (merger, store, events)
    }

    async fn put_manifest(store: &MemoryStore, id: &str, arch: &str, os: &str) {
        let manifest = json!({"id": id, "architecture": arch, "os": os});
        store
            .put_content(&image_json_path(id), manifest.to_string().as_bytes())
            .await
            .unwrap();
    }

    // --- merge_image_lists ---

    #[test]
    fn test_merge_keeps_existing_checksum() {
        let existing = records(json!([{"id": "sha1", "checksum": "abc"}]));
        let incoming = records(json!([{"id": "sha1"}]));

        let merged = merge_image_lists(&incoming, &existing);
        assert_eq!(merged.get("sha1").unwrap().checksum.as_deref(), Some("abc"));
    }

    #[test]
    fn test_merge_incoming_checksum_wins() {
        let existing = records(json!([{"id": "sha1", "checksum": "old"}]));
        let incoming = records(json!([{"id": "sha1", "checksum": "new"}]));

        let merged = merge_image_lists(&incoming, &existing);
        assert_eq!(merged.get("sha1").unwrap().checksum.as_deref(), Some("new"));
    }

    #[test]
    fn test_merge_empty_checksum_does_not_pin() {
        let existing = records(json!([{"id": "sha1", "checksum": "abc"}]));
        let incoming = records(json!([{"id": "sha1", "checksum": ""}]));

        let merged = merge_image_lists(&incoming, &existing);
        assert_eq!(merged.get("sha1").unwrap().checksum.as_deref(), Some("abc"));
    }

    #[test]
    fn test_merge_drops_extra_fields_and_dedups() {
        let incoming = records(json!([
            {"id": "sha1", "Tag": "latest", "checksum": "abc"},
            {"id": "sha2"},
            {"id": "sha2", "checksum": "def"}
        ]));
        let existing = records(json!([{"id": "sha3"}, {"id": "sha1"}]));

        let merged = merge_image_lists(&incoming, &existing);
        assert_eq!(
            serde_json::to_value(&merged).unwrap(),
            json!([
                {"id": "sha1", "checksum": "abc"},
                {"id": "sha2", "checksum": "def"},
                {"id": "sha3"}
            ])
        );

        let mut ids: Vec<_> = merged.iter().map(|r| r.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), merged.len());
    }

    #[test]
    fn test_merge_is_idempotent() {
        let existing = records(json!([
            {"id": "sha1", "checksum": "abc"},
            {"id": "sha2"},
            {"id": "sha4", "checksum": "ghi"}
        ]));
        let incoming = records(json!([
            {"id": "sha1"},
            {"id": "sha2", "checksum": "def"},
            {"id": "sha3"}
        ]));

        let once = merge_image_lists(&incoming, &existing);
        let once_records: Vec<ImageRecord> = once.iter().cloned().collect();
        let twice = merge_image_lists(&incoming, &once_records);
        assert_eq!(once, twice);
    }

    // --- parse_incoming ---

    #[test]
    fn test_parse_incoming_rejects_bad_payloads() {
        assert!(matches!(
            parse_incoming(b"{not json"),
            Err(AppError::MalformedInput(msg)) if msg == "Error Decoding JSON"
        ));
        assert!(matches!(
            parse_incoming(br#"{"id": "sha1"}"#),
            Err(AppError::MalformedInput(msg)) if msg == "Invalid data"
        ));
        assert!(matches!(
            parse_incoming(br#"[{"checksum": "abc"}]"#),
            Err(AppError::MalformedRecord(_))
        ));
        assert!(matches!(
            parse_incoming(br#"[{"id": 7}]"#),
            Err(AppError::MalformedRecord(_))
        ));
        assert!(matches!(
            parse_incoming(br#"[{"id": "../../etc"}]"#),
            Err(AppError::MalformedRecord(_))
        ));
        assert!(matches!(
            parse_incoming(br#"["sha1"]"#),
            Err(AppError::MalformedRecord(_))
        ));
        assert!(parse_incoming(b"[]").unwrap().is_empty());
    }

    // --- ImageIndexMerger ---

    #[tokio::test]
    async fn test_push_then_update_scenario() {
        let (merger, store, events) = create_merger();
        let mut rx = events.subscribe();
        let path = index_images_path(&repo());

        let first = br#"[{"id": "sha1"}]"#;
        let update = merger
            .update_index_images(&repo(), first, PlatformTag::default())
            .await
            .unwrap();
        assert_eq!(update.kind, EventKind::Created);
        assert_eq!(update.value, json!([{"id": "sha1"}]));
        assert_eq!(store.get_content(&path).await.unwrap(), first);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::Created);
        assert_eq!(event.namespace, "acme");
        assert_eq!(event.repository, "web");

        let second = br#"[{"id": "sha1", "checksum": "abc"}, {"id": "sha2"}]"#;
        let update = merger
            .update_index_images(&repo(), second, PlatformTag::default())
            .await
            .unwrap();
        assert_eq!(update.kind, EventKind::Updated);
        let expected = json!([{"id": "sha1", "checksum": "abc"}, {"id": "sha2"}]);
        assert_eq!(update.value, expected);
        assert_eq!(store.get_json(&path).await.unwrap(), expected);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::Updated);
        assert_eq!(event.value, expected);
    }

    #[tokio::test]
    async fn test_created_stores_payload_verbatim() {
        let (merger, store, _events) = create_merger();
        let raw = br#"[{"id": "sha1", "Tag": "latest"}]"#;

        let update = merger
            .update_index_images(&repo(), raw, PlatformTag::default())
            .await
            .unwrap();

        assert_eq!(update.value, json!([{"id": "sha1", "Tag": "latest"}]));
        assert_eq!(
            store.get_content(&index_images_path(&repo())).await.unwrap(),
            raw
        );
    }

    #[tokio::test]
    async fn test_malformed_record_mutates_nothing() {
        let (merger, store, events) = create_merger();
        let mut rx = events.subscribe();

        let result = merger
            .update_index_images(&repo(), br#"[{"id": "sha1"}, {}]"#, PlatformTag::default())
            .await;
        assert!(matches!(result, Err(AppError::MalformedRecord(_))));
        assert!(matches!(
            store.get_content(&index_images_path(&repo())).await,
            Err(AppError::NotFound(_))
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_platform_from_first_manifest() {
        let (merger, store, events) = create_merger();
        let mut rx = events.subscribe();
        put_manifest(&store, "sha1", "arm", "linux").await;

        let update = merger
            .update_index_images(
                &repo(),
                br#"[{"id": "sha1"}, {"id": "sha2"}]"#,
                PlatformTag::default(),
            )
            .await
            .unwrap();
        assert_eq!(update.platform, PlatformTag::new("arm", "linux"));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.arch, "arm");
        assert_eq!(event.os, "linux");
    }

    #[tokio::test]
    async fn test_declared_platform_without_manifest() {
        let (merger, _store, _events) = create_merger();
        let declared = PlatformTag::new("s390x", "linux");

        let update = merger
            .update_index_images(&repo(), br#"[{"id": "sha1"}]"#, declared.clone())
            .await
            .unwrap();
        assert_eq!(update.platform, declared);
    }

    #[tokio::test]
    async fn test_concurrent_write_is_a_conflict() {
        struct RacingStore(MemoryStore);

        #[async_trait]
        impl ContentStore for RacingStore {
            async fn get_content(&self, path: &str) -> crate::AppResult<Vec<u8>> {
                let content = self.0.get_content(path).await;
                // Another push lands right after our read.
                self.0.put_content(path, br#"[{"id": "other"}]"#).await?;
                content
            }

            async fn put_content(&self, path: &str, content: &[u8]) -> crate::AppResult<()> {
                self.0.put_content(path, content).await
            }

            async fn put_content_if(
                &self,
                path: &str,
                expected: Option<&[u8]>,
                content: &[u8],
            ) -> crate::AppResult<()> {
                self.0.put_content_if(path, expected, content).await
            }

            async fn list(&self, prefix: &str) -> crate::AppResult<Vec<String>> {
                self.0.list(prefix).await
            }
        }

        let store = Arc::new(RacingStore(MemoryStore::new()));
        let merger = ImageIndexMerger::new(store, Arc::new(BroadcastSink::new(4)));

        let result = merger
            .update_index_images(&repo(), br#"[{"id": "sha1"}]"#, PlatformTag::default())
            .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    // --- ImageListRetriever ---

    async fn stored(store: &MemoryStore, raw: &[u8]) {
        store
            .put_content(&index_images_path(&repo()), raw)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_retrieve_missing_index() {
        let store = Arc::new(MemoryStore::new());
        let retriever = ImageListRetriever::new(store);

        let err = retriever
            .get_repository_images(&repo(), &PlatformTag::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(ref msg) if msg == "images not found"));
    }

    #[tokio::test]
    async fn test_retrieve_platform_mismatch() {
        let store = Arc::new(MemoryStore::new());
        stored(&store, br#"[{"id": "sha1"}]"#).await;
        put_manifest(&store, "sha1", "arm", "linux").await;
        let retriever = ImageListRetriever::new(store);

        let err = retriever
            .get_repository_images(&repo(), &PlatformTag::new("amd64", "linux"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PlatformMismatch { .. }));
        assert!(err.is_not_found());

        let content = retriever
            .get_repository_images(&repo(), &PlatformTag::new("arm", "linux"))
            .await
            .unwrap();
        assert_eq!(content, br#"[{"id": "sha1"}]"#);
    }

    #[tokio::test]
    async fn test_retrieve_without_manifest_returns_raw() {
        let store = Arc::new(MemoryStore::new());
        let raw = br#"[ {"id": "sha1", "checksum": "abc"} ]"#;
        stored(&store, raw).await;
        let retriever = ImageListRetriever::new(store);

        let content = retriever
            .get_repository_images(&repo(), &PlatformTag::new("ppc64le", "linux"))
            .await
            .unwrap();
        assert_eq!(content, raw);
    }

    #[tokio::test]
    async fn test_retrieve_empty_list() {
        let store = Arc::new(MemoryStore::new());
        stored(&store, b"[]").await;
        let retriever = ImageListRetriever::new(store);

        let content = retriever
            .get_repository_images(&repo(), &PlatformTag::default())
            .await
            .unwrap();
        assert_eq!(content, b"[]");
    }

    struct MirrorWithImages;

    #[async_trait]
    impl UpstreamSource for MirrorWithImages {
        async fn search(
            &self,
            _: &str,
            _: &PlatformTag,
        ) -> crate::AppResult<Vec<SearchResultEntry>> {
            Ok(Vec::new())
        }

        async fn repository_images(
            &self,
            _: &Repository,
            _: &PlatformTag,
        ) -> crate::AppResult<Vec<u8>> {
            Ok(br#"[{"id": "upstream"}]"#.to_vec())
        }
    }

    struct UnreachableMirror;

    #[async_trait]
    impl UpstreamSource for UnreachableMirror {
        async fn search(
            &self,
            _: &str,
            _: &PlatformTag,
        ) -> crate::AppResult<Vec<SearchResultEntry>> {
            Err(AppError::Upstream("timeout".into()))
        }

        async fn repository_images(
            &self,
            _: &Repository,
            _: &PlatformTag,
        ) -> crate::AppResult<Vec<u8>> {
            Err(AppError::Upstream("timeout".into()))
        }
    }

    #[tokio::test]
    async fn test_retrieve_falls_back_to_mirror() {
        let store = Arc::new(MemoryStore::new());
        let retriever = ImageListRetriever::new(store.clone()).with_mirror(Arc::new(MirrorWithImages));

        let content = retriever
            .get_repository_images(&repo(), &PlatformTag::default())
            .await
            .unwrap();
        assert_eq!(content, br#"[{"id": "upstream"}]"#);

        // A local list for the right platform is served without asking the mirror.
        stored(&store, br#"[{"id": "local"}]"#).await;
        let content = retriever
            .get_repository_images(&repo(), &PlatformTag::default())
            .await
            .unwrap();
        assert_eq!(content, br#"[{"id": "local"}]"#);
    }

    #[tokio::test]
    async fn test_unreachable_mirror_keeps_local_error() {
        let store = Arc::new(MemoryStore::new());
        stored(&store, br#"[{"id": "sha1"}]"#).await;
        put_manifest(&store, "sha1", "arm", "linux").await;
        let retriever = ImageListRetriever::new(store).with_mirror(Arc::new(UnreachableMirror));

        let err = retriever
            .get_repository_images(&repo(), &PlatformTag::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PlatformMismatch { .. }));
    }
}
