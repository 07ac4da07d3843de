//! Tool to check whether the transparent proxy bootstrap can run here

use std::env;
use std::process::exit;

use tproxy_bootstrap::config::{BootstrapSettings, DATABASE_URL_ENV};
use tproxy_bootstrap::environment::{check_environment, IssueSeverity};

fn main() {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    println!("=== Transparent Proxy Bootstrap Environment Check ===\n");

    let settings = BootstrapSettings {
        database_url: env::var(DATABASE_URL_ENV).ok(),
        ..Default::default()
    };
    let env_info = check_environment(&settings);

    let show = |path: &Option<std::path::PathBuf>| match path {
        Some(path) => path.display().to_string(),
        None => "not found".to_string(),
    };
    println!("Redirect daemon: {}", show(&env_info.daemon_path));
    println!("Packet filter:   {}", show(&env_info.iptables_path));
    match env_info.effective_uid {
        Some(uid) => println!("Effective uid:   {}", uid),
        None => println!("Effective uid:   unknown"),
    }
    println!("Store:           {}", env_info.store.as_deref().unwrap_or("none"));

    if env_info.issues.is_empty() {
        println!("\nNo issues found. The bootstrap can set up transparent proxying.");
        return;
    }

    println!("\nEnvironment issues:");
    let mut has_errors = false;

    for issue in &env_info.issues {
        let prefix = match issue.severity {
            IssueSeverity::Info => "INFO",
            IssueSeverity::Warning => "WARNING",
            IssueSeverity::Error => {
                has_errors = true;
                "ERROR"
            }
        };

        println!("  [{:7}] {}", prefix, issue.message);
        if let Some(resolution) = &issue.resolution {
            println!("            -> {}", resolution);
        }
    }

    if has_errors {
        println!("\nCritical issues were found. Please resolve them before starting.");
        exit(1);
    }
}
