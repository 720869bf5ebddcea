//! Test helpers for prober integration tests

#![allow(dead_code)]

use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

/// A device description served by a mock HTTP server
#[derive(Debug, Clone)]
pub struct DeviceFixture {
    pub name: String,
    pub xml_content: String,
}

impl DeviceFixture {
    /// Load a fixture from the fixtures directory
    pub fn load(filename: &str) -> Self {
        let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        path.push("tests/fixtures");
        path.push(filename);

        let xml_content = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("Failed to load fixture {}: {}", filename, e));

        Self {
            name: filename.to_string(),
            xml_content,
        }
    }

    /// The standard ZonePlayer fixture with its RINCON id replaced
    pub fn zone_player(rincon: &str) -> Self {
        let mut fixture = Self::load("zoneplayer_description.xml");
        fixture.xml_content = fixture
            .xml_content
            .replace("RINCON_000E58A0123401400", rincon);
        fixture
    }
}

/// Build an M-SEARCH reply for a ZonePlayer
pub fn ssdp_response(location: &str, rincon: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\n\
         CACHE-CONTROL: max-age = 1800\r\n\
         EXT:\r\n\
         LOCATION: {location}\r\n\
         SERVER: Linux UPnP/1.0 Sonos/70.3-88200 (ZPS9)\r\n\
         ST: urn:schemas-upnp-org:device:ZonePlayer:1\r\n\
         USN: uuid:{rincon}::urn:schemas-upnp-org:device:ZonePlayer:1\r\n\
         X-RINCON-BOOTSEQ: 123\r\n\
         X-RINCON-HOUSEHOLD: Sonos_test\r\n\r\n"
    )
}

/// Stand-in for the multicast group: a loopback UDP socket that waits for one
/// M-SEARCH and answers it with `replies`.
///
/// The task resolves to the M-SEARCH text it received.
pub async fn spawn_responder(replies: Vec<String>) -> (SocketAddr, JoinHandle<String>) {
    spawn_responder_rounds(replies, 1).await
}

/// Like [`spawn_responder`], answering `rounds` consecutive searches.
///
/// The task resolves to the last M-SEARCH text it received.
pub async fn spawn_responder_rounds(
    replies: Vec<String>,
    rounds: usize,
) -> (SocketAddr, JoinHandle<String>) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let mut buffer = [0u8; 2048];
        let mut last = String::new();
        for _ in 0..rounds {
            let (len, from) = socket.recv_from(&mut buffer).await.unwrap();
            for reply in &replies {
                socket.send_to(reply.as_bytes(), from).await.unwrap();
            }
            last = String::from_utf8_lossy(&buffer[..len]).to_string();
        }
        last
    });

    (addr, handle)
}
