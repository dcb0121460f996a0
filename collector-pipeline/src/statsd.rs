// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! A thin statsd client over non-blocking UDP.
//!
//! Metric tags arrive as plain key/value pairs; the registry builds them
//! from span dimensions at counter-creation time, so there is nothing to
//! validate here beyond what the statsd backend enforces.

use anyhow::anyhow;
use cadence::prelude::*;
use cadence::{Metric, MetricBuilder, QueuingMetricSink, StatsdClient, UdpMetricSink};
use std::net::{ToSocketAddrs, UdpSocket};
use tracing::{debug, error};

// Queue with a maximum capacity of 32K elements
const QUEUE_SIZE: usize = 32 * 1024;

/// A statsd client that flushes metrics to a given endpoint.
/// The default value has no endpoint and is thus disabled.
#[derive(Default)]
pub struct Statsd {
    client: Option<StatsdClient>,
}

impl Statsd {
    /// Create a client flushing to `host_port` ("host:port").
    pub fn new(host_port: &str) -> anyhow::Result<Self> {
        debug!("Creating statsd client for {host_port}");
        Ok(Self {
            client: Some(create_client(host_port)?),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    pub fn count(&self, name: &str, value: i64, tags: &[(String, String)]) {
        if let Some(client) = &self.client {
            if let Err(err) = do_send(client.count_with_tags(name, value), tags) {
                error!("Error while sending metric: {}", err);
            }
        }
    }

    pub fn gauge(&self, name: &str, value: f64, tags: &[(String, String)]) {
        if let Some(client) = &self.client {
            if let Err(err) = do_send(client.gauge_with_tags(name, value), tags) {
                error!("Error while sending metric: {}", err);
            }
        }
    }

    pub fn histogram(&self, name: &str, value: f64, tags: &[(String, String)]) {
        if let Some(client) = &self.client {
            if let Err(err) = do_send(client.histogram_with_tags(name, value), tags) {
                error!("Error while sending metric: {}", err);
            }
        }
    }
}

fn do_send<'m, T>(
    mut builder: MetricBuilder<'m, '_, T>,
    tags: &'m [(String, String)],
) -> anyhow::Result<()>
where
    T: Metric + From<String>,
{
    for (key, value) in tags {
        builder = builder.with_tag(key, value);
    }
    builder.try_send()?;
    Ok(())
}

fn create_client(host_port: &str) -> anyhow::Result<StatsdClient> {
    let server_address = host_port
        .to_socket_addrs()?
        .next()
        .ok_or(anyhow!("invalid address"))?;

    let socket = if server_address.is_ipv4() {
        UdpSocket::bind("0.0.0.0:0")?
    } else {
        UdpSocket::bind("[::]:0")?
    };
    socket.set_nonblocking(true)?;

    let sink = QueuingMetricSink::with_capacity(
        UdpMetricSink::from(server_address, socket)?,
        QUEUE_SIZE,
    );

    Ok(StatsdClient::from_sink("", sink))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::net;
    use std::time::Duration;

    fn pair(key: &str, value: &str) -> (String, String) {
        (key.to_string(), value.to_string())
    }

    #[test]
    fn test_statsd_datagrams() {
        let socket = net::UdpSocket::bind("127.0.0.1:0").expect("failed to bind host socket");
        let _ = socket.set_read_timeout(Some(Duration::from_millis(500)));

        let statsd = Statsd::new(&socket.local_addr().unwrap().to_string()).unwrap();
        statsd.count("test_count", 3, &[pair("foo", "bar")]);
        statsd.count("test_neg_count", -2, &[]);
        statsd.gauge("test_gauge", 7.6, &[]);
        statsd.histogram("test_histogram", 8.0, &[pair("svc", "fry"), pair("result", "ok")]);

        fn read(socket: &net::UdpSocket) -> String {
            let mut buf = [0; 100];
            socket.recv(&mut buf).expect("No data");
            let datagram = String::from_utf8_lossy(buf.strip_suffix(&[0]).unwrap());
            datagram.trim_matches(char::from(0)).to_string()
        }

        assert_eq!("test_count:3|c|#foo:bar", read(&socket));
        assert_eq!("test_neg_count:-2|c", read(&socket));
        assert_eq!("test_gauge:7.6|g", read(&socket));
        assert_eq!("test_histogram:8|h|#svc:fry,result:ok", read(&socket));
    }

    #[test]
    fn test_disabled_client_is_silent() {
        let statsd = Statsd::default();
        assert!(!statsd.is_enabled());
        statsd.count("nope", 1, &[]);
    }

    #[test]
    fn test_create_client_bad_address() {
        assert!(Statsd::new("localhost:99999").is_err());
    }
}
