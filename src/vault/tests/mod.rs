use super::test_helpers::*;
use super::*;
use crate::config::{MAX_CHUNK_SIZE, RefreshPolicy};
use crate::error::{Error, RegistryError, TransferError};
use crate::host::MemoryHost;
use bytes::Bytes;
use futures::StreamExt;
use std::time::Duration;

mod upload;
