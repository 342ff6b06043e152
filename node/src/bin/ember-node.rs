//! Entry point: load the config, build the node, run the loops.

use {
    ember_node::{Node, NodeConfig, NullNetwork},
    log::info,
    std::{path::PathBuf, process::exit, sync::Arc},
};

fn usage() -> ! {
    eprintln!("usage: ember-node [CONFIG.json]");
    exit(2);
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .init();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(flag) if flag == "-h" || flag == "--help" => usage(),
        Some(path) => match NodeConfig::load(&PathBuf::from(&path)) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("ember-node: failed to load {path}: {e}");
                exit(1);
            }
        },
        None => NodeConfig::default(),
    };
    if args.next().is_some() {
        usage();
    }

    let node = match Node::new(config, Arc::new(NullNetwork)) {
        Ok(node) => node,
        Err(e) => {
            eprintln!("ember-node: {e}");
            exit(1);
        }
    };
    info!("ember node {}", node.address());
    node.run().await;
}
