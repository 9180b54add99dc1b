//! CLI command implementations
//!
//! Each command is implemented in its own submodule.

pub mod build;
pub mod config;
pub mod purge;
pub mod queue;
pub mod schedule;
pub mod serve;

use anyhow::Result;
use clap::Subcommand;
use std::path::PathBuf;

use crate::cli::context::ServiceContext;

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve a publish payload and queue a build per locale
    Build {
        /// Publish payload (JSON)
        payload: PathBuf,

        /// Do not promote the builds once done
        #[arg(long)]
        no_promote: bool,

        /// Resolve dependency manifests from a store snapshot instead of the registry
        #[arg(long)]
        store: Option<PathBuf>,
    },

    /// Queue a single locale build
    Queue {
        /// Package name
        name: String,

        /// Package version
        #[arg(id = "pkg_version", value_name = "VERSION")]
        version: String,

        /// Locale to build
        #[arg(short, long, default_value = "en-US")]
        locale: String,

        /// Build environment
        #[arg(short, long, default_value = "dev")]
        env: String,

        /// Build type (defaults to webpack)
        #[arg(short = 't', long = "type")]
        build_type: Option<String>,

        /// Promote the build once done
        #[arg(long)]
        promote: bool,
    },

    /// Queue builds for locales behind the latest version
    Schedule {
        /// Environment to catch up
        #[arg(short, long)]
        env: String,

        /// Store snapshot with known packages and build heads
        #[arg(long)]
        store: PathBuf,
    },

    /// Remove stale entries from the build target root
    Purge {
        /// Target root (defaults to the configured target)
        #[arg(long)]
        target: Option<PathBuf>,

        /// Maximum entry age in seconds (defaults to the configured purge age)
        #[arg(long)]
        max_age: Option<u64>,
    },

    /// Run the purge janitor and catch-up timers until interrupted
    Serve {
        /// Store snapshot for catch-up scheduling and manifest lookups
        #[arg(long)]
        store: Option<PathBuf>,

        /// Environments to catch up (defaults to `schedule_envs`)
        #[arg(short, long)]
        env: Vec<String>,
    },

    /// Show the effective configuration
    Config {
        /// Print only the config file path
        #[arg(long)]
        path: bool,
    },
}

impl Commands {
    /// Execute the command
    pub async fn run(self, context: &ServiceContext) -> Result<()> {
        match self {
            Self::Build {
                payload,
                no_promote,
                store,
            } => {
                let options = build::BuildOptions {
                    payload,
                    promote: !no_promote,
                    store,
                };
                build::execute(context, options).await
            }
            Self::Queue {
                name,
                version,
                locale,
                env,
                build_type,
                promote,
            } => {
                let options = queue::QueueOptions {
                    name,
                    version,
                    locale,
                    env,
                    build_type,
                    promote,
                };
                queue::execute(context, options).await
            }
            Self::Schedule { env, store } => schedule::execute(context, &env, &store).await,
            Self::Purge { target, max_age } => purge::execute(context, target, max_age).await,
            Self::Serve { store, env } => serve::execute(context, store, env).await,
            Self::Config { path } => config::execute(context, path),
        }
    }
}
