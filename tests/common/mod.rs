//! Shared fixtures for integration tests: archive/WAV builders and tiny HTTP servers

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use flate2::write::GzEncoder;
use flate2::Compression;
use hound::{SampleFormat, WavSpec, WavWriter};
use speech_datasets::config::Config;
use speech_datasets::sources::{Dataset, DatasetSource};
use std::io::{BufRead, BufReader, Cursor, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Gzipped tarball with the given entries
pub fn tar_gz(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// In-memory 16-bit PCM WAV of a quiet ramp
pub fn wav_bytes(sample_rate: u32, channels: u16, frames: u32) -> Vec<u8> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..frames * u32::from(channels) {
            writer.write_sample(((i % 64) as i16 - 32) * 100).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

pub fn md5_hex(bytes: &[u8]) -> String {
    format!("{:x}", md5::compute(bytes))
}

/// Config with one dataset, fast retries and normalization off
pub fn config_for(root: &Path, sources: Vec<DatasetSource>) -> Config {
    let mut config = Config::default();
    config.paths.datasets_dir = root.join("datasets").to_string_lossy().into_owned();
    config.download.retries = 2;
    config.download.backoff_secs = 0;
    config.download.jitter_min_secs = 0;
    config.download.jitter_max_secs = 0;
    config.download.timeout_secs = 1;
    config.normalize.enabled = false;
    config.datasets = Some(vec![Dataset {
        name: "Corpus".to_owned(),
        subdir: "Corpus".to_owned(),
        sources,
    }]);
    config
}

fn read_request_head(stream: &TcpStream) {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).unwrap_or(0) == 0 || line == "\r\n" {
            return;
        }
    }
}

/// Serves `body` to every request using chunked encoding, 3 bytes per chunk
pub fn spawn_chunked_server(body: Vec<u8>) -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&requests);

    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            read_request_head(&stream);
            counter.fetch_add(1, Ordering::SeqCst);

            let head = "HTTP/1.1 200 OK\r\n\
                        Content-Type: application/gzip\r\n\
                        Transfer-Encoding: chunked\r\n\
                        Connection: close\r\n\r\n";
            if stream.write_all(head.as_bytes()).is_err() {
                continue;
            }
            for chunk in body.chunks(3) {
                let mut frame = format!("{:x}\r\n", chunk.len()).into_bytes();
                frame.extend_from_slice(chunk);
                frame.extend_from_slice(b"\r\n");
                if stream.write_all(&frame).and_then(|()| stream.flush()).is_err() {
                    break;
                }
            }
            let _ = stream.write_all(b"0\r\n\r\n");
        }
    });

    (addr, requests)
}

/// Serves `body` with a Content-Length, one byte per `gap`
pub fn spawn_dripping_server(body: Vec<u8>, gap: Duration) -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&requests);

    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            read_request_head(&stream);
            counter.fetch_add(1, Ordering::SeqCst);

            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            if stream.write_all(head.as_bytes()).is_err() {
                continue;
            }
            for byte in &body {
                std::thread::sleep(gap);
                if stream
                    .write_all(std::slice::from_ref(byte))
                    .and_then(|()| stream.flush())
                    .is_err()
                {
                    break;
                }
            }
        }
    });

    (addr, requests)
}

/// Accepts connections and reads requests but never answers
pub fn spawn_silent_server() -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&requests);

    std::thread::spawn(move || {
        let mut held = Vec::new();
        for stream in listener.incoming() {
            let Ok(stream) = stream else { continue };
            read_request_head(&stream);
            counter.fetch_add(1, Ordering::SeqCst);
            held.push(stream);
        }
    });

    (addr, requests)
}

/// Give a freshly spawned server thread a moment before the first connect
pub fn settle() {
    std::thread::sleep(Duration::from_millis(20));
}
