// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Request/reply channel to the host that owns resolution and transforms
//!
//! The worker side holds a [`HostChannel`], which implements both
//! [`ResolverHost`] and [`Transformer`] by sending messages. The host side
//! drains a [`HostReceiver`]. Messages are serde types, so the same calls can
//! be carried as JSON [`HostEnvelope`]s over any out-of-process transport.

use crate::error::{Result, RunnerError};
use crate::module_system::{ResolvedId, ResolverHost, TransformResult, Transformer};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};
use tracing::{trace, warn};

/// A call from a worker to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostRequest {
    /// Resolve a specifier
    #[serde(rename_all = "camelCase")]
    ResolveId {
        /// The specifier as written
        specifier: String,
        /// The importing module id
        importer: String,
    },
    /// Fetch transformed code for a module
    Fetch {
        /// Module id
        id: String,
    },
}

/// The host's answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostResponse {
    /// Answer to [`HostRequest::ResolveId`]
    Resolved {
        /// The resolution, or `None` when nothing matched
        resolved: Option<ResolvedId>,
    },
    /// Answer to [`HostRequest::Fetch`]
    Fetched {
        /// Transformed code
        result: TransformResult,
    },
    /// The call failed on the host
    Failed {
        /// Error message
        message: String,
    },
}

/// A numbered message, for transports that multiplex calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostEnvelope<T> {
    /// Call number; a reply carries the number of its request
    pub call: u64,
    /// The request or response
    pub body: T,
}

impl<T: Serialize> HostEnvelope<T> {
    /// Encode as JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl<T: for<'de> Deserialize<'de>> HostEnvelope<T> {
    /// Decode from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Message sent through the channel
struct PendingCall {
    envelope: HostEnvelope<HostRequest>,
    reply: oneshot::Sender<HostResponse>,
}

/// Worker side of the channel
#[derive(Clone)]
pub struct HostChannel {
    sender: mpsc::UnboundedSender<PendingCall>,
    next_call: Arc<AtomicU64>,
}

/// Host side of the channel
pub struct HostReceiver {
    receiver: mpsc::UnboundedReceiver<PendingCall>,
}

/// A received call waiting for its answer
pub struct HostCall {
    /// The numbered request
    pub envelope: HostEnvelope<HostRequest>,
    reply: oneshot::Sender<HostResponse>,
}

impl HostCall {
    /// Send the answer. Ignored if the worker stopped waiting.
    pub fn respond(self, response: HostResponse) {
        let _ = self.reply.send(response);
    }
}

impl HostChannel {
    /// Create a connected pair
    pub fn new() -> (HostChannel, HostReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            HostChannel {
                sender,
                next_call: Arc::new(AtomicU64::new(1)),
            },
            HostReceiver { receiver },
        )
    }

    /// Send a request and wait for its reply
    pub async fn call(&self, request: HostRequest) -> Result<HostResponse> {
        let call = self.next_call.fetch_add(1, Ordering::SeqCst);
        let (reply, response) = oneshot::channel();

        trace!(call, ?request, "host call");
        self.sender
            .send(PendingCall {
                envelope: HostEnvelope { call, body: request },
                reply,
            })
            .map_err(|_| RunnerError::Channel("host receiver dropped".to_string()))?;

        response
            .await
            .map_err(|_| RunnerError::Channel(format!("host dropped call {}", call)))
    }
}

#[async_trait]
impl ResolverHost for HostChannel {
    async fn resolve_id(&self, specifier: &str, importer: &str) -> Result<Option<ResolvedId>> {
        let request = HostRequest::ResolveId {
            specifier: specifier.to_string(),
            importer: importer.to_string(),
        };
        match self.call(request).await? {
            HostResponse::Resolved { resolved } => Ok(resolved),
            HostResponse::Failed { message } => Err(RunnerError::Channel(format!(
                "resolveId('{}') failed on host: {}",
                specifier, message
            ))),
            other => Err(unexpected(&other)),
        }
    }
}

#[async_trait]
impl Transformer for HostChannel {
    async fn fetch(&self, id: &str) -> Result<TransformResult> {
        match self.call(HostRequest::Fetch { id: id.to_string() }).await? {
            HostResponse::Fetched { result } => Ok(result),
            HostResponse::Failed { message } => Err(RunnerError::transform(id, message)),
            other => Err(unexpected(&other)),
        }
    }
}

fn unexpected(response: &HostResponse) -> RunnerError {
    RunnerError::Channel(format!("unexpected host response: {:?}", response))
}

impl HostReceiver {
    /// Wait for the next call; `None` once every worker handle is gone
    pub async fn recv(&mut self) -> Option<HostCall> {
        self.receiver.recv().await.map(|pending| HostCall {
            envelope: pending.envelope,
            reply: pending.reply,
        })
    }

    /// Answer every call with `resolver` and `transformer` until the worker
    /// side closes. Calls are handled concurrently.
    pub async fn serve(mut self, resolver: Arc<dyn ResolverHost>, transformer: Arc<dyn Transformer>) {
        while let Some(call) = self.recv().await {
            let resolver = Arc::clone(&resolver);
            let transformer = Arc::clone(&transformer);
            tokio::spawn(async move {
                let response = answer(&call.envelope.body, resolver.as_ref(), transformer.as_ref()).await;
                call.respond(response);
            });
        }
    }
}

/// Compute the host's response to one request
pub async fn answer(
    request: &HostRequest,
    resolver: &dyn ResolverHost,
    transformer: &dyn Transformer,
) -> HostResponse {
    let outcome = match request {
        HostRequest::ResolveId { specifier, importer } => resolver
            .resolve_id(specifier, importer)
            .await
            .map(|resolved| HostResponse::Resolved { resolved }),
        HostRequest::Fetch { id } => transformer
            .fetch(id)
            .await
            .map(|result| HostResponse::Fetched { result }),
    };

    outcome.unwrap_or_else(|err| {
        warn!(?request, error = %err, "host call failed");
        HostResponse::Failed {
            message: err.to_string(),
        }
    })
}
