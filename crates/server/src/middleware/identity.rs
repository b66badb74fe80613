use axum::extract::{ConnectInfo, Request};
use std::net::SocketAddr;

/// Identity attributes for one request. Authentication happens upstream;
/// the resolved actor and tenant arrive on trusted headers. The network
/// address is only used when no actor is present, so a user's limits follow
/// them across addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIdentity {
    pub actor_id: Option<String>,
    pub tenant_id: Option<String>,
    pub client_ip: String,
}

impl RequestIdentity {
    pub fn resolve(request: &Request) -> Self {
        let actor_id = header_value(request, "x-user-id");
        let tenant_id = header_value(request, "x-tenant-id");
        let client_ip = header_value(request, "x-forwarded-for")
            .and_then(|v| {
                v.split(',')
                    .next()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
            })
            .or_else(|| {
                request
                    .extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ci| ci.0.ip().to_string())
            })
            .unwrap_or_else(|| "unknown".to_string());
        Self {
            actor_id,
            tenant_id,
            client_ip,
        }
    }

    pub fn limiter_identifier(&self, class: &str) -> String {
        match &self.actor_id {
            Some(id) => format!("user:{id}:{class}"),
            None => format!("ip:{}:{class}", self.client_ip),
        }
    }
}

fn header_value(request: &Request, name: &str) -> Option<String> {
    request
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
