//! `grpc-keyword` monitors: a unary call built at runtime from a compiled
//! descriptor set, with the keyword predicate applied to the JSON
//! rendering of the response.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use http::uri::PathAndQuery;
use prost::Message;
use prost_reflect::{DescriptorPool, DynamicMessage, MessageDescriptor, MethodDescriptor};
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::transport::{ClientTlsConfig, Endpoint};
use tonic::{Request, Status as GrpcStatus};

use super::{keyword_matches, ProbeContext, ProbeDriver, ProbeError, ProbeOutcome};
use crate::db::models::{Heartbeat, Monitor};
use crate::monitor::status::Status;

pub struct GrpcKeywordDriver;

#[async_trait]
impl ProbeDriver for GrpcKeywordDriver {
    async fn check(
        &self,
        monitor: &Monitor,
        beat: &mut Heartbeat,
        ctx: &ProbeContext<'_>,
    ) -> Result<ProbeOutcome, ProbeError> {
        let url = monitor
            .grpc_url
            .as_deref()
            .ok_or_else(|| ProbeError::Config("gRPC URL is not configured".to_string()))?;
        let keyword = monitor
            .keyword
            .as_deref()
            .ok_or_else(|| ProbeError::Config("Keyword is not configured".to_string()))?;
        let service_name = monitor
            .grpc_service_name
            .as_deref()
            .ok_or_else(|| ProbeError::Config("gRPC service is not configured".to_string()))?;
        let method_name = monitor
            .grpc_method
            .as_deref()
            .ok_or_else(|| ProbeError::Config("gRPC method is not configured".to_string()))?;
        let descriptor_b64 = monitor
            .grpc_descriptor
            .as_deref()
            .ok_or_else(|| ProbeError::Config("gRPC descriptor is not configured".to_string()))?;

        let descriptor_bytes = base64::engine::general_purpose::STANDARD
            .decode(descriptor_b64.trim())
            .map_err(|e| ProbeError::Config(format!("Invalid descriptor encoding: {e}")))?;
        let pool = DescriptorPool::decode(descriptor_bytes.as_slice())
            .map_err(|e| ProbeError::Config(format!("Invalid descriptor set: {e}")))?;

        let service = pool
            .services()
            .find(|service| {
                service.full_name() == service_name || service.name() == service_name
            })
            .ok_or_else(|| {
                ProbeError::Config(format!("Service {service_name} not found in descriptor"))
            })?;
        let method = service
            .methods()
            .find(|method| method.name() == method_name)
            .ok_or_else(|| {
                ProbeError::Config(format!("Method {method_name} not found on {service_name}"))
            })?;

        let body = monitor.grpc_body.as_deref().unwrap_or("{}");
        let mut deserializer = serde_json::Deserializer::from_str(body);
        let message = DynamicMessage::deserialize(method.input(), &mut deserializer)
            .map_err(|e| ProbeError::Config(format!("Invalid gRPC request body: {e}")))?;

        let scheme = if monitor.grpc_enable_tls { "https" } else { "http" };
        let endpoint_url = if url.contains("://") {
            url.to_string()
        } else {
            format!("{scheme}://{url}")
        };
        let timeout = Duration::from_secs_f64(ctx.timeout);
        let mut endpoint = Endpoint::from_shared(endpoint_url)
            .map_err(|e| ProbeError::Config(format!("Invalid gRPC URL: {e}")))?
            .connect_timeout(timeout)
            .timeout(timeout);
        if monitor.grpc_enable_tls {
            endpoint = endpoint
                .tls_config(ClientTlsConfig::new().with_native_roots())
                .map_err(|e| ProbeError::Network(e.to_string()))?;
        }

        let started = Instant::now();
        let channel = endpoint
            .connect()
            .await
            .map_err(|e| ProbeError::Network(e.to_string()))?;
        let mut grpc = tonic::client::Grpc::new(channel);
        grpc.ready()
            .await
            .map_err(|e| ProbeError::Network(e.to_string()))?;

        let rpc_path = format!("/{}/{}", service.full_name(), method.name());
        let path = PathAndQuery::try_from(rpc_path.as_str())
            .map_err(|e| ProbeError::Config(e.to_string()))?;
        let codec = DynamicCodec {
            method: method.clone(),
        };
        let response = grpc
            .unary(Request::new(message), path, codec)
            .await
            .map_err(|status| ProbeError::Network(format!("gRPC call failed: {status}")))?;
        beat.ping = Some(started.elapsed().as_millis() as f64);

        let rendered = serde_json::to_string(&response.into_inner()).unwrap_or_default();
        let snippet: String = rendered.chars().take(50).collect();
        if keyword_matches(&rendered, keyword, monitor.invert_keyword) {
            beat.status = Status::Up;
            beat.msg = format!("{snippet}, keyword [{keyword}] matched");
            Ok(ProbeOutcome::Beat)
        } else if monitor.invert_keyword {
            Err(ProbeError::Predicate(format!(
                "keyword [{keyword}] found in [{snippet}] while inverted"
            )))
        } else {
            Err(ProbeError::Predicate(format!(
                "keyword [{keyword}] not in [{snippet}]"
            )))
        }
    }
}

/// Encodes/decodes [`DynamicMessage`] values for a single method, letting
/// tonic carry messages that were never compiled into the binary.
#[derive(Clone)]
struct DynamicCodec {
    method: MethodDescriptor,
}

impl Codec for DynamicCodec {
    type Encode = DynamicMessage;
    type Decode = DynamicMessage;
    type Encoder = DynamicEncoder;
    type Decoder = DynamicDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        DynamicEncoder
    }

    fn decoder(&mut self) -> Self::Decoder {
        DynamicDecoder {
            descriptor: self.method.output(),
        }
    }
}

struct DynamicEncoder;

impl Encoder for DynamicEncoder {
    type Item = DynamicMessage;
    type Error = GrpcStatus;

    fn encode(&mut self, item: DynamicMessage, dst: &mut EncodeBuf<'_>) -> Result<(), GrpcStatus> {
        item.encode(dst)
            .map_err(|e| GrpcStatus::internal(e.to_string()))
    }
}

struct DynamicDecoder {
    descriptor: MessageDescriptor,
}

impl Decoder for DynamicDecoder {
    type Item = DynamicMessage;
    type Error = GrpcStatus;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<DynamicMessage>, GrpcStatus> {
        let mut message = DynamicMessage::new(self.descriptor.clone());
        message
            .merge(src)
            .map_err(|e| GrpcStatus::internal(e.to_string()))?;
        Ok(Some(message))
    }
}
