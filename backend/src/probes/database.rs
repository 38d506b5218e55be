//! Database monitors: postgres, mysql, sqlserver, mongodb, redis.
//!
//! Every driver opens a one-shot connection, runs the configured query (or
//! a server-level ping) and reports the latency. Connections are not
//! pooled: a probe must observe the full connect path, not a warm socket.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use mongodb::bson::doc;
use sqlx::Connection;
use tokio::net::TcpStream;
use tokio_util::compat::TokioAsyncWriteCompatExt;

use super::{ProbeContext, ProbeDriver, ProbeError, ProbeOutcome};
use crate::db::models::{Heartbeat, Monitor};
use crate::monitor::status::Status;

const DEFAULT_QUERY: &str = "SELECT 1";

fn connection_string(monitor: &Monitor) -> Result<&str, ProbeError> {
    monitor
        .database_connection_string
        .as_deref()
        .ok_or_else(|| ProbeError::Config("Connection string is not configured".to_string()))
}

fn query_string(monitor: &Monitor) -> &str {
    monitor
        .database_query
        .as_deref()
        .filter(|query| !query.trim().is_empty())
        .unwrap_or(DEFAULT_QUERY)
}

pub struct PostgresDriver;

#[async_trait]
impl ProbeDriver for PostgresDriver {
    async fn check(
        &self,
        monitor: &Monitor,
        beat: &mut Heartbeat,
        ctx: &ProbeContext<'_>,
    ) -> Result<ProbeOutcome, ProbeError> {
        let conn_str = connection_string(monitor)?;
        let timeout = Duration::from_secs_f64(ctx.timeout);

        let started = Instant::now();
        let mut conn =
            tokio::time::timeout(timeout, sqlx::postgres::PgConnection::connect(conn_str))
                .await
                .map_err(|_| ProbeError::Network("Connection timed out".to_string()))?
                .map_err(|e| ProbeError::Network(e.to_string()))?;
        sqlx::query(query_string(monitor))
            .fetch_all(&mut conn)
            .await
            .map_err(|e| ProbeError::Network(e.to_string()))?;
        let _ = conn.close().await;

        beat.ping = Some(started.elapsed().as_millis() as f64);
        beat.status = Status::Up;
        Ok(ProbeOutcome::Beat)
    }
}

pub struct MysqlDriver;

#[async_trait]
impl ProbeDriver for MysqlDriver {
    async fn check(
        &self,
        monitor: &Monitor,
        beat: &mut Heartbeat,
        ctx: &ProbeContext<'_>,
    ) -> Result<ProbeOutcome, ProbeError> {
        let conn_str = connection_string(monitor)?;
        let timeout = Duration::from_secs_f64(ctx.timeout);

        let started = Instant::now();
        let mut conn = tokio::time::timeout(timeout, sqlx::mysql::MySqlConnection::connect(conn_str))
            .await
            .map_err(|_| ProbeError::Network("Connection timed out".to_string()))?
            .map_err(|e| ProbeError::Network(e.to_string()))?;
        let rows = sqlx::query(query_string(monitor))
            .fetch_all(&mut conn)
            .await
            .map_err(|e| ProbeError::Network(e.to_string()))?;
        let _ = conn.close().await;

        beat.ping = Some(started.elapsed().as_millis() as f64);
        beat.status = Status::Up;
        beat.msg = format!("Rows: {}", rows.len());
        Ok(ProbeOutcome::Beat)
    }
}

pub struct SqlServerDriver;

#[async_trait]
impl ProbeDriver for SqlServerDriver {
    async fn check(
        &self,
        monitor: &Monitor,
        beat: &mut Heartbeat,
        ctx: &ProbeContext<'_>,
    ) -> Result<ProbeOutcome, ProbeError> {
        let conn_str = connection_string(monitor)?;
        let config = tiberius::Config::from_ado_string(conn_str)
            .map_err(|e| ProbeError::Config(format!("Invalid connection string: {e}")))?;
        let timeout = Duration::from_secs_f64(ctx.timeout);

        let started = Instant::now();
        let tcp = tokio::time::timeout(timeout, TcpStream::connect(config.get_addr()))
            .await
            .map_err(|_| ProbeError::Network("Connection timed out".to_string()))??;
        tcp.set_nodelay(true)?;
        let mut client = tiberius::Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| ProbeError::Network(e.to_string()))?;
        let stream = client
            .simple_query(query_string(monitor))
            .await
            .map_err(|e| ProbeError::Network(e.to_string()))?;
        stream
            .into_results()
            .await
            .map_err(|e| ProbeError::Network(e.to_string()))?;

        beat.ping = Some(started.elapsed().as_millis() as f64);
        beat.status = Status::Up;
        Ok(ProbeOutcome::Beat)
    }
}

pub struct MongoDriver;

#[async_trait]
impl ProbeDriver for MongoDriver {
    async fn check(
        &self,
        monitor: &Monitor,
        beat: &mut Heartbeat,
        ctx: &ProbeContext<'_>,
    ) -> Result<ProbeOutcome, ProbeError> {
        let conn_str = connection_string(monitor)?;
        let timeout = Duration::from_secs_f64(ctx.timeout);

        let started = Instant::now();
        let client = tokio::time::timeout(timeout, mongodb::Client::with_uri_str(conn_str))
            .await
            .map_err(|_| ProbeError::Network("Connection timed out".to_string()))?
            .map_err(|e| ProbeError::Network(e.to_string()))?;
        let reply = client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| ProbeError::Network(e.to_string()))?;

        let ok = reply.get_f64("ok").unwrap_or_else(|_| {
            reply.get_i32("ok").map(f64::from).unwrap_or(0.0)
        });
        if ok != 1.0 {
            return Err(ProbeError::Predicate(format!(
                "MongoDB ping returned ok={ok}"
            )));
        }

        beat.ping = Some(started.elapsed().as_millis() as f64);
        beat.status = Status::Up;
        Ok(ProbeOutcome::Beat)
    }
}

pub struct RedisDriver;

#[async_trait]
impl ProbeDriver for RedisDriver {
    async fn check(
        &self,
        monitor: &Monitor,
        beat: &mut Heartbeat,
        ctx: &ProbeContext<'_>,
    ) -> Result<ProbeOutcome, ProbeError> {
        let conn_str = connection_string(monitor)?;
        let client = redis::Client::open(conn_str)
            .map_err(|e| ProbeError::Config(format!("Invalid Redis URL: {e}")))?;
        let timeout = Duration::from_secs_f64(ctx.timeout);

        let started = Instant::now();
        let mut conn = tokio::time::timeout(timeout, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| ProbeError::Network("Connection timed out".to_string()))?
            .map_err(|e| ProbeError::Network(e.to_string()))?;
        let reply: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| ProbeError::Network(e.to_string()))?;

        beat.ping = Some(started.elapsed().as_millis() as f64);
        beat.status = Status::Up;
        beat.msg = reply;
        Ok(ProbeOutcome::Beat)
    }
}
