// Copyright (C) 2026 Brian Johnson
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

// OTA firmware upload protocol implementation
mod auth;
mod connection;
mod error;
mod progress;
mod protocol;
mod transport;
mod uploader;

use clap::Parser;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use connection::TcpConnection;
use protocol::{CONNECT_TIMEOUT, DEFAULT_PORT, UPLOAD_TIMEOUT};
use uploader::{perform_upload, UploadOptions};

#[derive(Parser)]
#[command(name = "otalink")]
#[command(about = "Upload firmware to a device over the network (OTA)", long_about = None)]
struct Cli {
    /// Device hostname or IP address
    host: String,

    /// Firmware image to upload
    file: PathBuf,

    /// OTA port on the device
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// OTA password, if the device requires one
    #[arg(long, env = "OTA_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Timeout in seconds for establishing the connection
    #[arg(long, default_value_t = CONNECT_TIMEOUT.as_secs(), value_name = "SECS",
          value_parser = clap::value_parser!(u64).range(1..))]
    connect_timeout: u64,

    /// Timeout in seconds for each read/write once the upload starts
    #[arg(long, default_value_t = UPLOAD_TIMEOUT.as_secs(), value_name = "SECS",
          value_parser = clap::value_parser!(u64).range(1..))]
    upload_timeout: u64,

    /// Do not offer a gzip compressed image to the device
    #[arg(long)]
    no_compression: bool,

    /// Enable debug output
    #[arg(long)]
    debug: bool,
}

fn main() {
    let cli = Cli::parse();

    // RUST_LOG overrides the --debug level
    let level = if cli.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to initialise logging: {}", e);
    }

    std::process::exit(run_ota(&cli));
}

fn run_ota(cli: &Cli) -> i32 {
    let payload = match load_firmware(&cli.file) {
        Ok(payload) => payload,
        Err(e) => {
            error!("Failed to read firmware: {}", e);
            return 1;
        }
    };

    let addrs = match (cli.host.as_str(), cli.port).to_socket_addrs() {
        Ok(addrs) => addrs.collect::<Vec<_>>(),
        Err(e) => {
            error!("Error resolving IP address of {}. Is it connected to WiFi?", cli.host);
            error!("{}", e);
            return 1;
        }
    };

    let options = UploadOptions {
        upload_timeout: Duration::from_secs(cli.upload_timeout),
        offer_compression: !cli.no_compression,
        ..UploadOptions::default()
    };

    upload_to_first(
        &addrs,
        Duration::from_secs(cli.connect_timeout),
        cli.password.as_deref(),
        payload,
        &cli.file.display().to_string(),
        options,
    )
}

/// Upload over the first address that accepts a connection. Returns the exit status.
fn upload_to_first(
    addrs: &[SocketAddr],
    connect_timeout: Duration,
    password: Option<&str>,
    payload: Vec<u8>,
    filename: &str,
    options: UploadOptions,
) -> i32 {
    for addr in addrs {
        info!("Connecting to {} port {}...", addr.ip(), addr.port());
        let conn = match TcpConnection::connect(addr, connect_timeout) {
            Ok(conn) => conn,
            Err(e) => {
                error!("Connecting to {} port {} failed: {}", addr.ip(), addr.port(), e);
                continue;
            }
        };

        info!("Connected to {}", addr.ip());
        return match perform_upload(Box::new(conn), password, payload, filename, options) {
            Ok(()) => 0,
            Err(e) => {
                if let Some(kind) = e.device_error() {
                    debug!("Device reported error code 0x{:02X}", kind.code());
                }
                error!("{}", e);
                1
            }
        };
    }

    error!("Connection failed.");
    1
}

fn load_firmware(path: &Path) -> std::io::Result<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| std::io::Error::new(e.kind(), format!("{}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;
    use crate::auth::md5_hex;
    use crate::protocol::*;

    fn quiet_options() -> UploadOptions {
        UploadOptions {
            settle_delay: Duration::ZERO,
            offer_compression: false,
            progress: Box::new(std::io::sink()),
            ..UploadOptions::default()
        }
    }

    /// Plays the device side of a version 2 upload without auth
    fn fake_device(listener: TcpListener) -> thread::JoinHandle<Vec<u8>> {
        thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();

            let mut magic = [0u8; 5];
            sock.read_exact(&mut magic).unwrap();
            assert_eq!(magic, MAGIC_BYTES);
            sock.write_all(&[RESPONSE_OK, OTA_VERSION_2_0]).unwrap();

            let mut features = [0u8; 1];
            sock.read_exact(&mut features).unwrap();
            assert_eq!(features[0], 0x00);
            sock.write_all(&[RESPONSE_HEADER_OK, RESPONSE_AUTH_OK]).unwrap();

            let mut size = [0u8; 4];
            sock.read_exact(&mut size).unwrap();
            let size = u32::from_be_bytes(size) as usize;
            sock.write_all(&[RESPONSE_UPDATE_PREPARE_OK]).unwrap();

            let mut checksum = [0u8; 32];
            sock.read_exact(&mut checksum).unwrap();
            sock.write_all(&[RESPONSE_BIN_MD5_OK]).unwrap();

            let mut received = Vec::with_capacity(size);
            while received.len() < size {
                let chunk = UPLOAD_BLOCK_SIZE.min(size - received.len());
                let mut buf = vec![0u8; chunk];
                sock.read_exact(&mut buf).unwrap();
                received.extend_from_slice(&buf);
                sock.write_all(&[RESPONSE_CHUNK_OK]).unwrap();
            }
            assert_eq!(md5_hex(&received).as_bytes(), &checksum);

            sock.write_all(&[RESPONSE_RECEIVE_OK, RESPONSE_UPDATE_END_OK]).unwrap();
            let mut ack = [0xFFu8; 1];
            sock.read_exact(&mut ack).unwrap();
            assert_eq!(ack[0], RESPONSE_OK);

            received
        })
    }

    #[test]
    fn test_upload_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let device = fake_device(listener);

        let payload: Vec<u8> = (0..30_000u32).map(|i| (i * 7 % 256) as u8).collect();
        let status = upload_to_first(
            &[addr],
            CONNECT_TIMEOUT,
            None,
            payload.clone(),
            "loopback.bin",
            quiet_options(),
        );

        assert_eq!(status, 0);
        assert_eq!(device.join().unwrap(), payload);
    }

    #[test]
    fn test_skips_unreachable_address() {
        // Bind then release a port so nothing is listening on it
        let dead = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let device = fake_device(listener);

        let payload = vec![0x33; 100];
        let status = upload_to_first(
            &[dead, addr],
            CONNECT_TIMEOUT,
            None,
            payload.clone(),
            "retry.bin",
            quiet_options(),
        );

        assert_eq!(status, 0);
        assert_eq!(device.join().unwrap(), payload);
    }

    #[test]
    fn test_no_reachable_address() {
        let dead = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
        let status = upload_to_first(
            &[dead],
            Duration::from_secs(1),
            None,
            vec![1, 2, 3],
            "none.bin",
            quiet_options(),
        );
        assert_eq!(status, 1);
    }

    #[test]
    fn test_load_firmware() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"firmware contents").unwrap();

        assert_eq!(load_firmware(file.path()).unwrap(), b"firmware contents");

        let missing = file.path().with_extension("missing");
        let err = load_firmware(&missing).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
        assert!(err.to_string().starts_with(&missing.display().to_string()));
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["otalink", "device.local", "fw.bin"]).unwrap();
        assert_eq!(cli.port, DEFAULT_PORT);
        assert_eq!(cli.connect_timeout, 10);
        assert_eq!(cli.upload_timeout, 30);
        assert!(!cli.no_compression);
        assert_eq!(cli.file, PathBuf::from("fw.bin"));
    }

    #[test]
    fn test_cli_rejects_zero_timeouts() {
        for flag in ["--upload-timeout", "--connect-timeout"] {
            let err = Cli::try_parse_from(["otalink", "device.local", "fw.bin", flag, "0"])
                .err()
                .expect("zero timeout accepted");
            assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        }

        let cli = Cli::try_parse_from(["otalink", "device.local", "fw.bin", "--upload-timeout", "1"])
            .unwrap();
        assert_eq!(cli.upload_timeout, 1);
    }
}
