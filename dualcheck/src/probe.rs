// Copyright (c) The dualcheck Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use dualcheck_runner::{errors::ProbeError, identity::ConnectivityProbe};
use std::{
    net::{TcpStream, ToSocketAddrs},
    time::Duration,
};
use tracing::debug;

/// Checks reachability by opening a TCP connection to `host:port`.
#[derive(Clone, Debug)]
pub(crate) struct TcpProbe {
    address: String,
    timeout: Duration,
}

impl TcpProbe {
    pub(crate) fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
        }
    }
}

impl ConnectivityProbe for TcpProbe {
    fn probe(&self) -> Result<(), ProbeError> {
        let addrs = self
            .address
            .to_socket_addrs()
            .map_err(|error| ProbeError::Resolve {
                address: self.address.clone(),
                error: Some(error),
            })?;

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(_) => {
                    debug!("connectivity probe reached {addr}");
                    return Ok(());
                }
                Err(error) => {
                    debug!("connectivity probe failed for {addr}: {error}");
                    last_error = Some(error);
                }
            }
        }

        match last_error {
            Some(error) => Err(ProbeError::Connect {
                address: self.address.clone(),
                error,
            }),
            None => Err(ProbeError::Resolve {
                address: self.address.clone(),
                error: None,
            }),
        }
    }
}
