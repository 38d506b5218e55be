//! `dns` monitors: resolve a name against a specific server and report the
//! formatted answer, remembering it so changes are persisted.

use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts};
use hickory_resolver::proto::rr::rdata::caa;
use hickory_resolver::proto::rr::{RData, RecordType};
use hickory_resolver::TokioAsyncResolver;

use super::{ProbeContext, ProbeDriver, ProbeError, ProbeOutcome};
use crate::db::models::{Heartbeat, Monitor};
use crate::db::services as db;
use crate::monitor::status::Status;

pub struct DnsDriver;

#[async_trait]
impl ProbeDriver for DnsDriver {
    async fn check(
        &self,
        monitor: &Monitor,
        beat: &mut Heartbeat,
        ctx: &ProbeContext<'_>,
    ) -> Result<ProbeOutcome, ProbeError> {
        let hostname = monitor
            .hostname
            .as_deref()
            .ok_or_else(|| ProbeError::Config("Hostname is not configured".to_string()))?;
        let server = monitor
            .dns_resolve_server
            .as_deref()
            .ok_or_else(|| ProbeError::Config("Resolve server is not configured".to_string()))?;
        let server_ip: IpAddr = server
            .parse()
            .map_err(|_| ProbeError::Config(format!("Invalid resolve server: {server}")))?;
        let record_type: RecordType = monitor
            .dns_resolve_type
            .as_deref()
            .unwrap_or("A")
            .parse()
            .map_err(|_| ProbeError::Config("Invalid DNS resolve type".to_string()))?;

        let socket = SocketAddr::new(server_ip, monitor.dns_resolve_server_port as u16);
        let mut config = ResolverConfig::new();
        config.add_name_server(NameServerConfig::new(socket, Protocol::Udp));
        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs_f64(ctx.timeout);
        opts.attempts = 1;
        let resolver = TokioAsyncResolver::tokio(config, opts);

        let started = Instant::now();
        let lookup = resolver
            .lookup(hostname, record_type)
            .await
            .map_err(|e| ProbeError::Network(e.to_string()))?;
        beat.ping = Some(started.elapsed().as_millis() as f64);

        let rdatas: Vec<&RData> = lookup.iter().collect();
        let msg = format_records(record_type, &rdatas);

        if monitor.dns_last_result.as_deref() != Some(msg.as_str()) {
            db::update_dns_last_result(ctx.pool, monitor.id, &msg).await?;
        }

        beat.status = Status::Up;
        beat.msg = msg;
        Ok(ProbeOutcome::Beat)
    }
}

/// Renders answers into the per-type message format shown to users.
pub(crate) fn format_records(record_type: RecordType, rdatas: &[&RData]) -> String {
    let plain: Vec<String> = rdatas.iter().map(|rdata| rdata.to_string()).collect();
    match record_type {
        RecordType::A | RecordType::AAAA | RecordType::TXT | RecordType::PTR => {
            format!("Records: {}", plain.join(" | "))
        }
        RecordType::CNAME => plain.first().cloned().unwrap_or_default(),
        RecordType::NS => format!("Servers: {}", plain.join(" | ")),
        RecordType::MX => rdatas
            .iter()
            .filter_map(|rdata| match rdata {
                RData::MX(mx) => Some(format!(
                    "Hostname: {} - Priority: {}",
                    mx.exchange(),
                    mx.preference()
                )),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(" | "),
        RecordType::SOA => rdatas
            .iter()
            .find_map(|rdata| match rdata {
                RData::SOA(soa) => Some(format!(
                    "NS-Name: {} | Hostmaster: {} | Serial: {} | Refresh: {} | Retry: {} | Expire: {} | MinTTL: {}",
                    soa.mname(),
                    soa.rname(),
                    soa.serial(),
                    soa.refresh(),
                    soa.retry(),
                    soa.expire(),
                    soa.minimum()
                )),
                _ => None,
            })
            .unwrap_or_default(),
        RecordType::SRV => rdatas
            .iter()
            .filter_map(|rdata| match rdata {
                RData::SRV(srv) => Some(format!(
                    "Name: {} | Port: {} | Priority: {} | Weight: {}",
                    srv.target(),
                    srv.port(),
                    srv.priority(),
                    srv.weight()
                )),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(" | "),
        RecordType::CAA => rdatas
            .iter()
            .find_map(|rdata| match rdata {
                RData::CAA(record) => Some(match record.value() {
                    caa::Value::Issuer(Some(issuer), _) => issuer.to_string(),
                    caa::Value::Issuer(None, _) => ";".to_string(),
                    other => format!("{other:?}"),
                }),
                _ => None,
            })
            .unwrap_or_default(),
        _ => plain.join(" | "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_resolver::proto::rr::rdata::{A, MX, SOA};
    use hickory_resolver::proto::rr::Name;
    use std::str::FromStr;

    #[test]
    fn a_records_are_joined_with_pipes() {
        let first = RData::A(A::from(std::net::Ipv4Addr::new(93, 184, 216, 34)));
        let second = RData::A(A::from(std::net::Ipv4Addr::new(93, 184, 216, 35)));
        let msg = format_records(RecordType::A, &[&first, &second]);
        assert_eq!(msg, "Records: 93.184.216.34 | 93.184.216.35");
    }

    #[test]
    fn mx_records_show_exchange_and_priority() {
        let mx = RData::MX(MX::new(10, Name::from_str("mail.example.com.").unwrap()));
        let msg = format_records(RecordType::MX, &[&mx]);
        assert_eq!(msg, "Hostname: mail.example.com. - Priority: 10");
    }

    #[test]
    fn soa_records_render_all_fields() {
        let soa = RData::SOA(SOA::new(
            Name::from_str("ns.example.com.").unwrap(),
            Name::from_str("hostmaster.example.com.").unwrap(),
            2024010101,
            7200,
            3600,
            1209600,
            300,
        ));
        let msg = format_records(RecordType::SOA, &[&soa]);
        assert!(msg.starts_with("NS-Name: ns.example.com. | Hostmaster: hostmaster.example.com."));
        assert!(msg.ends_with("MinTTL: 300"));
        assert!(msg.contains("Serial: 2024010101"));
    }
}
