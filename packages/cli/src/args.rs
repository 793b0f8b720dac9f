use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use lineage::models::{EchoParams, EditOperation, EffectKind, ListScope};

#[derive(Parser, Debug)]
#[command(
    name = "lineage",
    version,
    about = "Versioned audio editing with undo",
    arg_required_else_help = true
)]
pub struct Cli {
    /// Acting user id, recorded in the activity log.
    #[arg(long, global = true, default_value_t = 0, env = "LINEAGE_USER")]
    pub user: i32,

    /// Per-call bound on each media engine invocation, in seconds.
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an empty project.
    CreateProject { name: String },

    /// List the projects a user owns, with their files.
    Projects {
        /// Owner to list for (default: the acting user).
        #[arg(long)]
        owner: Option<i32>,
    },

    /// Upload a file as the original of a new lineage.
    Upload {
        #[arg(long)]
        project: i32,
        file: PathBuf,
        /// Name to store under (default: the file's own name).
        #[arg(long)]
        name: Option<String>,
    },

    /// Apply an edit to the head of a lineage.
    Edit {
        #[arg(long)]
        project: i32,
        name: String,
        #[command(subcommand)]
        op: EditCommand,
    },

    /// Mix the heads of two lineages.
    Merge {
        #[arg(long)]
        project: i32,
        a: String,
        b: String,
    },

    /// Remove the head of a lineage.
    Undo {
        #[arg(long)]
        project: i32,
        name: String,
    },

    /// Delete the head of a lineage.
    Delete {
        #[arg(long)]
        project: i32,
        name: String,
    },

    /// Show the head, or every version, of a lineage.
    List {
        #[arg(long)]
        project: i32,
        name: String,
        #[arg(long)]
        all: bool,
    },

    /// Show the head of every lineage in a project.
    Heads {
        #[arg(long)]
        project: i32,
    },

    /// Look up one version by its stored name.
    FindVersion {
        #[arg(long)]
        project: i32,
        stored_name: String,
    },

    /// Delete a project with all of its files.
    DeleteProject { project: i32 },

    /// Remove artifacts no project links to.
    Gc,

    /// Report artifacts whose blob is missing.
    Check {
        #[arg(long)]
        project: i32,
    },
}

#[derive(Subcommand, Debug)]
pub enum EditCommand {
    /// Keep only [start, end).
    Trim(Range),
    /// Append a copy of [start, end) to the end.
    Extend(Range),
    /// Cut [start, end) out.
    Shorten(Range),
    /// Apply an echo or reverb.
    Effect(EffectArgs),
}

#[derive(Args, Debug)]
pub struct Range {
    pub start: f64,
    pub end: f64,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum EffectChoice {
    Echo,
    Reverb,
}

#[derive(Args, Debug)]
pub struct EffectArgs {
    pub kind: EffectChoice,
    #[arg(long, requires_all = ["out_gain", "delay_ms", "decay"])]
    pub in_gain: Option<f64>,
    #[arg(long)]
    pub out_gain: Option<f64>,
    #[arg(long)]
    pub delay_ms: Option<f64>,
    #[arg(long)]
    pub decay: Option<f64>,
}

impl EditCommand {
    pub fn into_operation(self) -> EditOperation {
        match self {
            Self::Trim(Range { start, end }) => EditOperation::Trim { start, end },
            Self::Extend(Range { start, end }) => EditOperation::Extend { start, end },
            Self::Shorten(Range { start, end }) => EditOperation::Shorten { start, end },
            Self::Effect(args) => {
                let kind = match args.kind {
                    EffectChoice::Echo => EffectKind::Echo,
                    EffectChoice::Reverb => EffectKind::Reverb,
                };
                let params = match (args.in_gain, args.out_gain, args.delay_ms, args.decay) {
                    (Some(in_gain), Some(out_gain), Some(delay_ms), Some(decay)) => {
                        Some(EchoParams {
                            in_gain,
                            out_gain,
                            delay_ms,
                            decay,
                        })
                    }
                    _ => None,
                };
                EditOperation::Effect { kind, params }
            }
        }
    }
}

pub fn scope(all: bool) -> ListScope {
    if all {
        ListScope::AllVersions
    } else {
        ListScope::Head
    }
}
