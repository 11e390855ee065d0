//! A MySQL server shared by the backend tests.
//!
//! The first test to ask for a database starts a `mysql:8.4` container; every test then gets its
//! own freshly created schema on that server. Requires a running Docker daemon.

use std::sync::Mutex;
use std::time::Duration;

use mysql::prelude::*;
use mysql::{Conn, Opts};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};
use uuid::Uuid;

use crate::mysql::MysqlHistory;

const ROOT_PASSWORD: &str = "updown";

/// The running container and its root URL (without a schema).
static SERVER: Mutex<Option<(ContainerAsync<GenericImage>, String)>> = Mutex::new(None);

async fn server_url() -> String {
    let mut server = SERVER.lock().unwrap_or_else(|e| e.into_inner());
    if server.is_none() {
        *server = Some(start_server().await);
    }
    server.as_ref().map(|(_, url)| url.clone()).unwrap()
}

async fn start_server() -> (ContainerAsync<GenericImage>, String) {
    let container = GenericImage::new("mysql", "8.4")
        .with_env_var("MYSQL_ROOT_PASSWORD", ROOT_PASSWORD)
        .start()
        .await
        .expect("failed to start mysql container");
    let port = container
        .get_host_port_ipv4(3306)
        .await
        .expect("mysql container exposes no port");
    let url = format!("mysql://root:{}@127.0.0.1:{}", ROOT_PASSWORD, port);

    // The image first runs a temporary server without networking, so the port only accepts
    // connections once the real server is up.
    let opts = Opts::from_url(&url).expect("parse root url");
    for _ in 0..240 {
        if Conn::new(opts.clone()).is_ok() {
            return (container, url);
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    panic!("mysql container at {} never accepted connections", url);
}

/// Create an empty schema and return a [MysqlHistory] connected to it.
pub async fn fresh_history() -> MysqlHistory {
    let root = server_url().await;
    let schema = format!("updown_{}", Uuid::new_v4().simple());
    let mut admin =
        Conn::new(Opts::from_url(&root).expect("parse root url")).expect("connect as root");
    admin
        .query_drop(format!("CREATE DATABASE `{}` CHARACTER SET utf8mb4", schema))
        .expect("create test schema");
    MysqlHistory::connect(&format!("{}/{}", root, schema)).expect("connect to test schema")
}

#[ctor::dtor]
fn stop_server() {
    let Ok(runtime) = tokio::runtime::Runtime::new() else {
        return;
    };
    let server = SERVER.lock().unwrap_or_else(|e| e.into_inner()).take();
    runtime.block_on(async move { drop(server) });
}
