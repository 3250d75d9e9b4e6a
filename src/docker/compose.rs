//! `docker-compose.yml` rendering.
//!
//! The file always describes a single `macos` service running the
//! `dockurr/macos` image. Only the OS version, RAM size and host storage path
//! vary. The storage path is inserted verbatim: a path containing YAML
//! syntax (`: `, `#`, leading `-`, ...) yields a broken file.

use std::path::{Path, PathBuf};

use crate::docker::{COMPOSE_FILE_NAME, ContainerConfig, IMAGE, SERVICE_NAME};

/// Render the compose file for `config`.
///
/// Pure and deterministic: the same config always gives the same bytes.
pub fn render(config: &ContainerConfig) -> String {
    format!(
        "services:
  {service}:
    image: {image}
    container_name: {service}
    environment:
      VERSION: \"{version}\"
      RAM_SIZE: \"{ram}\"
    devices:
      - /dev/kvm
      - /dev/net/tun
    cap_add:
      - NET_ADMIN
    ports:
      - 8006:8006
      - 5900:5900/tcp
      - 5900:5900/udp
    volumes:
      - {storage}:/storage
    restart: always
    stop_grace_period: 2m
",
        service = SERVICE_NAME,
        image = IMAGE,
        version = config.os_version,
        ram = config.ram_size,
        storage = config.storage_path,
    )
}

/// Location of the compose file inside `work_dir`.
pub fn compose_path(work_dir: &Path) -> PathBuf {
    work_dir.join(COMPOSE_FILE_NAME)
}

/// Render `config` and write it to `work_dir/docker-compose.yml`, replacing
/// any previous file. Returns the path written.
pub async fn write(work_dir: &Path, config: &ContainerConfig) -> std::io::Result<PathBuf> {
    let path = compose_path(work_dir);
    tokio::fs::write(&path, render(config)).await?;
    Ok(path)
}
