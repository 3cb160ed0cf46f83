//! Splitting a byte stream into chunks and uploading them
//!
//! Chunks are carved lazily from the input: a piece is only read once an
//! upload slot is free, so memory stays bounded by
//! `upload_concurrency × max_chunk_size` however large the input is.

use crate::error::{Error, Result, TransferError};
use crate::host::AttachmentHost;
use crate::utils::chunk_label;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream, StreamExt};
use std::sync::Arc;

/// Limits for one upload
#[derive(Clone, Copy, Debug)]
pub(crate) struct ChunkPlan {
    pub(crate) max_chunk_size: usize,
    pub(crate) concurrency: usize,
}

/// Links of a fully uploaded file
#[derive(Debug)]
pub(crate) struct Uploaded {
    pub(crate) links: Vec<String>,
    pub(crate) size: u64,
}

/// Re-cut a stream of arbitrary pieces into pieces of exactly `max` bytes
/// (the last one may be shorter)
///
/// Whole chunks inside a large piece are sliced out of it without copying;
/// only chunks straddling piece boundaries are assembled in a buffer.
pub(crate) fn split<S>(input: S, max: usize) -> impl Stream<Item = Result<Bytes>> + Send
where
    S: Stream<Item = Result<Bytes>> + Send + Unpin,
{
    let max = max.max(1);
    stream::try_unfold(
        (input, Bytes::new(), BytesMut::new(), false),
        move |(mut input, mut pending, mut buf, mut done)| async move {
            loop {
                if buf.is_empty() && pending.len() >= max {
                    let chunk = pending.split_to(max);
                    return Ok(Some((chunk, (input, pending, buf, done))));
                }

                if !pending.is_empty() {
                    let take = pending.len().min(max - buf.len());
                    buf.extend_from_slice(&pending.split_to(take));
                }
                if buf.len() == max {
                    let chunk = buf.split().freeze();
                    return Ok(Some((chunk, (input, pending, buf, done))));
                }

                // pending is drained whenever buf is short of a chunk
                if done {
                    break;
                }
                match input.next().await {
                    Some(piece) => pending = piece?,
                    None => done = true,
                }
            }

            if buf.is_empty() {
                return Ok(None);
            }
            let chunk = buf.split().freeze();
            Ok(Some((chunk, (input, pending, buf, done))))
        },
    )
}

/// Upload every chunk of `input`, preserving order
///
/// `on_chunk(index, bytes_so_far)` runs once per stored chunk in index order.
/// The first failure aborts the upload: pending uploads are dropped and
/// chunks already stored stay orphaned on the host. Chunk uploads are never
/// retried.
pub(crate) async fn upload_chunks<S>(
    host: Arc<dyn AttachmentHost>,
    name: &str,
    input: S,
    plan: ChunkPlan,
    expected_size: Option<u64>,
    mut on_chunk: impl FnMut(usize, u64) + Send,
) -> Result<Uploaded>
where
    S: Stream<Item = Result<Bytes>> + Send + Unpin,
{
    let uploads = split(input, plan.max_chunk_size)
        .enumerate()
        .map(|(i, piece)| {
            let host = host.clone();
            let index = i + 1;
            let label = chunk_label(name, index);
            let name = name.to_string();
            async move {
                let piece = piece?;
                let len = piece.len() as u64;
                tracing::debug!(name = %name, chunk = index, bytes = len, "uploading chunk");

                let url = host.upload_blob(piece, &label).await.map_err(|e| {
                    TransferError::UploadChunkFailed {
                        name: name.clone(),
                        index,
                        reason: e.to_string(),
                    }
                })?;
                Ok::<_, Error>((index, len, url))
            }
        })
        .buffered(plan.concurrency.max(1));
    futures::pin_mut!(uploads);

    let mut links = Vec::new();
    let mut size = 0u64;

    while let Some(result) = uploads.next().await {
        let (index, len, url) = result?;
        size += len;

        if let Some(expected) = expected_size.filter(|&e| size > e) {
            return Err(Error::SizeMismatch {
                name: name.to_string(),
                expected,
                actual: size,
            });
        }

        links.push(url);
        on_chunk(index, size);
    }

    if links.is_empty() {
        return Err(Error::EmptyUpload(name.to_string()));
    }
    if let Some(expected) = expected_size.filter(|&e| e != size) {
        return Err(Error::SizeMismatch {
            name: name.to_string(),
            expected,
            actual: size,
        });
    }

    Ok(Uploaded { links, size })
}
