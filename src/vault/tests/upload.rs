use super::*;

#[tokio::test]
async fn one_byte_round_trip() {
    let (vault, _host, _dir) = create_test_vault().await;

    let record = vault.upload_bytes("one.bin", Bytes::from_static(b"x")).await.unwrap();

    assert_eq!(record.total_chunks, 1);
    assert_eq!(record.size_bytes, Some(1));
    let body = read_all(vault.download("one.bin").await.unwrap()).await.unwrap();
    assert_eq!(body, b"x");
}

#[tokio::test]
async fn exactly_max_chunk_size_is_one_chunk() {
    let (vault, _host, _dir) = create_test_vault().await;
    let data = payload(MAX_CHUNK_SIZE);

    let record = vault.upload_bytes("exact.bin", data.clone()).await.unwrap();

    assert_eq!(record.total_chunks, 1);
    let body = read_all(vault.download("exact.bin").await.unwrap()).await.unwrap();
    assert_eq!(body.len(), MAX_CHUNK_SIZE);
    assert!(body == data, "round-tripped bytes differ");
}

#[tokio::test]
async fn one_byte_over_max_is_two_chunks() {
    let (vault, host, _dir) = create_test_vault().await;
    let data = payload(MAX_CHUNK_SIZE + 1);

    let record = vault.upload_bytes("over.bin", data.clone()).await.unwrap();

    assert_eq!(record.total_chunks, 2);
    assert_eq!(record.chunk_links.len(), 2);
    let mut labels = host.uploaded_labels();
    labels.sort();
    assert_eq!(labels, vec!["over.bin.part1", "over.bin.part2"]);

    let body = read_all(vault.download("over.bin").await.unwrap()).await.unwrap();
    assert!(body == data, "round-tripped bytes differ");
}

#[tokio::test]
async fn k_chunks_plus_remainder_keeps_order() {
    let (vault, _host, _dir) = create_test_vault_with(MemoryHost::new(), small_chunks(10)).await;
    let data = payload(3 * 10 + 7);

    let record = vault.upload_bytes("parts.bin", data.clone()).await.unwrap();

    assert_eq!(record.total_chunks, 4);
    let body = read_all(vault.download("parts.bin").await.unwrap()).await.unwrap();
    assert_eq!(body, data.to_vec());
}

#[tokio::test]
async fn empty_upload_is_rejected() {
    let (vault, host, dir) = create_test_vault().await;

    let err = vault.upload_bytes("empty.bin", Bytes::new()).await.unwrap_err();

    assert!(matches!(err, Error::EmptyUpload(_)));
    assert_eq!(host.upload_calls(), 0);
    assert!(vault.list_names().await.is_empty());
    assert!(!dir.path().join("uploads.json").exists());
}

#[tokio::test]
async fn invalid_name_is_rejected_before_network() {
    let (vault, host, _dir) = create_test_vault().await;

    let err = vault
        .upload_bytes("../escape", Bytes::from_static(b"data"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidName { .. }));
    assert_eq!(host.upload_calls(), 0);
}

#[tokio::test]
async fn failure_of_second_chunk_writes_no_record() {
    let host = MemoryHost::new();
    host.fail_upload_call(2);
    let (vault, host, dir) = create_test_vault_with(host, |config| {
        config.transfer.max_chunk_size = 4;
        config.transfer.upload_concurrency = 1;
    })
    .await;
    let mut events = vault.subscribe();

    let err = vault
        .upload_bytes("three.bin", Bytes::from_static(b"aaaabbbbcccc"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Transfer(TransferError::UploadChunkFailed { index: 2, .. })
    ));
    assert!(matches!(vault.get_file("three.bin").await, Err(Error::NotFound(_))));
    assert!(!dir.path().join("uploads.json").exists());
    // first chunk stays behind as an orphan on the host
    assert_eq!(host.blob_count(), 1);

    let mut saw_failure = false;
    while let Ok(event) = events.try_recv() {
        if let Event::UploadFailed { ref name, .. } = event {
            assert_eq!(name, "three.bin");
            saw_failure = true;
        }
        assert!(!matches!(event, Event::UploadComplete { .. }));
    }
    assert!(saw_failure);
}

#[tokio::test]
async fn concurrent_uploads_of_different_names_both_persist() {
    let (vault, _host, dir) = create_test_vault_with(
        MemoryHost::new().with_upload_delay(Duration::from_millis(20)),
        small_chunks(8),
    )
    .await;

    let (a, b) = tokio::join!(
        vault.upload_bytes("a.bin", payload(40)),
        vault.upload_bytes("b.bin", payload(25)),
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(vault.list_names().await, vec!["a.bin", "b.bin"]);

    let reopened = crate::registry::Registry::open(dir.path().join("uploads.json"), false)
        .await
        .unwrap();
    assert_eq!(reopened.list_names().await, vec!["a.bin", "b.bin"]);
}

#[tokio::test]
async fn upload_concurrency_is_respected() {
    let (vault, host, _dir) = create_test_vault_with(
        MemoryHost::new().with_upload_delay(Duration::from_millis(20)),
        |config| {
            config.transfer.max_chunk_size = 2;
            config.transfer.upload_concurrency = 3;
        },
    )
    .await;

    vault.upload_bytes("wide.bin", payload(20)).await.unwrap();

    assert_eq!(host.upload_calls(), 10);
    assert_eq!(host.peak_concurrent_uploads(), 3);
}

#[tokio::test]
async fn same_name_overwrites_previous_record() {
    let (vault, _host, _dir) = create_test_vault_with(MemoryHost::new(), small_chunks(4)).await;

    vault.upload_bytes("dup.bin", payload(4)).await.unwrap();
    vault.upload_bytes("dup.bin", payload(12)).await.unwrap();

    let record = vault.get_file("dup.bin").await.unwrap();
    assert_eq!(record.total_chunks, 3);
    assert_eq!(vault.list_names().await, vec!["dup.bin"]);
}

#[tokio::test]
async fn announced_size_mismatch_fails_upload() {
    let (vault, _host, _dir) = create_test_vault().await;
    let data = futures::stream::iter([Ok(Bytes::from_static(b"abc"))]);

    let err = vault.upload("sized.bin", data, Some(10)).await.unwrap_err();

    assert!(matches!(err, Error::SizeMismatch { expected: 10, actual: 3, .. }));
    assert!(vault.get_file("sized.bin").await.is_err());
}

#[tokio::test]
async fn upload_file_streams_from_disk_with_default_name() {
    let (vault, _host, dir) = create_test_vault_with(MemoryHost::new(), small_chunks(1000)).await;
    let path = dir.path().join("report.pdf");
    let data = payload(4321);
    std::fs::write(&path, &data).unwrap();

    let record = vault.upload_file(&path, None).await.unwrap();

    assert_eq!(record.name, "report.pdf");
    assert_eq!(record.total_chunks, 5);
    assert_eq!(record.size_bytes, Some(4321));

    let renamed = vault.upload_file(&path, Some("copy.pdf")).await.unwrap();
    assert_eq!(renamed.name, "copy.pdf");
}

#[tokio::test]
async fn upload_emits_progress_events_in_order() {
    let (vault, _host, _dir) = create_test_vault_with(MemoryHost::new(), small_chunks(5)).await;
    let mut events = vault.subscribe();

    vault.upload_bytes("ev.bin", payload(12)).await.unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }

    assert!(matches!(&seen[0], Event::UploadStarted { total_size: Some(12), .. }));
    let progress: Vec<(usize, u64)> = seen
        .iter()
        .filter_map(|e| match e {
            Event::ChunkUploaded {
                index,
                bytes_uploaded,
                ..
            } => Some((*index, *bytes_uploaded)),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![(1, 5), (2, 10), (3, 12)]);
    assert!(matches!(
        seen.last(),
        Some(Event::UploadComplete {
            total_chunks: 3,
            size_bytes: 12,
            ..
        })
    ));
}
