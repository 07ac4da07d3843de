//! Daemon configuration artifact
//!
//! Renders the redsocks configuration binding the local redirect port to the
//! remote SOCKS5 proxy.

use std::fs;
use std::io::Write;
use std::net::Ipv4Addr;
use std::path::Path;

use log::debug;

use crate::common::Result;
use crate::store::ProxyConfig;

/// Bind address of the redirect listener
///
/// Traffic redirected from PREROUTING arrives on the address of the incoming
/// interface, so the daemon must listen on all of them.
pub const LOCAL_BIND: Ipv4Addr = Ipv4Addr::UNSPECIFIED;

/// Render the daemon configuration
pub fn render_config(proxy: &ProxyConfig, local_port: u16) -> String {
    format!(
        r#"base {{
    log_debug = off;
    log_info = on;
    log = stderr;
    daemon = off;
    redirector = iptables;
}}

redsocks {{
    local_ip = {local_ip};
    local_port = {local_port};
    ip = {ip};
    port = {port};
    type = socks5;
    login = "{login}";
    password = "{password}";
}}
"#,
        local_ip = LOCAL_BIND,
        local_port = local_port,
        ip = proxy.host,
        port = proxy.port,
        login = quote(&proxy.username),
        password = quote(&proxy.password),
    )
}

/// Write the rendered configuration to `path`, readable by the owner only
pub fn write_config(path: &Path, proxy: &ProxyConfig, local_port: u16) -> Result<()> {
    let rendered = render_config(proxy, local_port);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    // A pre-existing file keeps its old mode on open
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(rendered.as_bytes())?;
    file.sync_all()?;

    debug!("Wrote daemon configuration to {}", path.display());
    Ok(())
}

fn quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
