//! Shared helpers for the server integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use open8055_access::UserStore;
use open8055_core::CardId;
use open8055_hardware::AnyCardDevice;
use open8055_hardware::mock::{SimulatedBoard, SimulatedBoardHandle};
use open8055_server::{
    PolicyCell, RemoteClient, RemoteClientConfig, Server, ServerConfig, ServerHandle,
};
use tokio::task::JoinHandle;

/// Access lists trusting every client.
pub const TRUST_ALL: &str = r#"
[access]
connect = "0.0.0.0/0 all trust"
default = "0.0.0.0/0 all trust"
"#;

pub fn card(n: u8) -> CardId {
    CardId::new(n).unwrap()
}

/// A server on a loopback port with a simulated board.
pub struct TestServer {
    pub addr: SocketAddr,
    pub board: SimulatedBoardHandle,
    pub handle: ServerHandle,
    task: JoinHandle<open8055_server::Result<()>>,
}

impl TestServer {
    pub async fn start(cards: &[u8], config: &str) -> Self {
        let config = ServerConfig::from_toml(config).unwrap();
        let policy = PolicyCell::new(config.access_policy().unwrap());
        let cards: Vec<CardId> = cards.iter().map(|&n| card(n)).collect();
        let (board, handle) = SimulatedBoard::with_cards(&cards);

        let mut server = Server::bind_addr(
            "127.0.0.1:0".parse().unwrap(),
            Arc::new(AnyCardDevice::Simulated(board)),
            policy,
        )
        .await
        .unwrap();
        let addr = server.local_addr().unwrap();
        let server_handle = server.handle();
        let task = tokio::spawn(async move {
            let result = server.run().await;
            server.shutdown().await;
            result
        });

        Self {
            addr,
            board: handle,
            handle: server_handle,
            task,
        }
    }

    pub fn client_config(&self) -> RemoteClientConfig {
        RemoteClientConfig {
            server_addr: self.addr,
            timeout: Duration::from_secs(2),
        }
    }

    pub async fn client(&self) -> RemoteClient {
        RemoteClient::connect(self.client_config()).await.unwrap()
    }

    /// Request shutdown and wait until the acceptor has stopped.
    pub async fn stop(self) -> open8055_server::Result<()> {
        self.handle.shutdown();
        tokio::time::timeout(Duration::from_secs(10), self.task)
            .await
            .expect("server did not stop")
            .unwrap()
    }
}

/// Write a users file with one user per `(name, password)`.
pub fn write_users(path: &Path, users: &[(&str, &str)]) {
    let mut store = UserStore::new();
    for (name, password) in users {
        store.upsert(name, Some(false), Some(*password)).unwrap();
    }
    store.save(path).unwrap();
}
