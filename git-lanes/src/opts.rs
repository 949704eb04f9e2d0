//! The command-line options for `git-lanes`.

use std::path::PathBuf;

use clap::{Args, Parser, ValueEnum};

/// How to handle terminal colors and Unicode glyphs.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ColorSetting {
    /// Decide from the `lanes.graph.unicode` setting, or else from whether
    /// output is a terminal. This is the default behavior.
    Auto,
    /// Always draw with Unicode box-drawing characters.
    Always,
    /// Only ever draw with ASCII characters.
    Never,
}

/// Arguments which apply to all subcommands.
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Change to the given directory before executing the rest of the program.
    /// (The option is called `-C` for symmetry with Git.)
    #[clap(value_parser, short = 'C', global = true)]
    pub working_directory: Option<PathBuf>,

    /// Flag to force enable or disable Unicode glyphs.
    #[clap(value_parser, long = "color", value_enum, global = true)]
    pub color: Option<ColorSetting>,
}

/// Options for narrowing down a history.
#[derive(Debug, Default, Args)]
pub struct FilterOptions {
    /// Only show commits whose author name or email contains this string.
    #[clap(value_parser, long = "author")]
    pub author: Option<String>,

    /// Only show commits whose message contains this string.
    #[clap(value_parser, long = "grep")]
    pub grep: Option<String>,
}

/// `git-lanes` subcommands.
#[derive(Debug, Parser)]
pub enum Command {
    /// Show the history of a branch, tag or `HEAD`.
    Log {
        /// The reference to show, like `main`, `origin/main` or
        /// `refs/tags/v1.0`. Defaults to `HEAD`.
        #[clap(value_parser)]
        reference: Option<String>,

        /// Draw the commit graph next to each commit.
        #[clap(action, long = "graph")]
        graph: bool,

        /// Show at most this many commits.
        #[clap(value_parser, short = 'n', long = "max-count")]
        max_count: Option<usize>,

        #[clap(flatten)]
        filter_options: FilterOptions,
    },

    /// List branches and tags.
    Refs {
        /// Only list references whose description (e.g. `branch main` or
        /// `tag v1.0`) contains this string.
        #[clap(value_parser, long = "filter")]
        filter: Option<String>,
    },
}

/// Browse Git history one reference at a time.
#[derive(Debug, Parser)]
#[clap(version = env!("CARGO_PKG_VERSION"))]
pub struct Opts {
    /// Global arguments.
    #[clap(flatten)]
    pub global_args: GlobalArgs,

    /// The `git-lanes` subcommand to run.
    #[clap(subcommand)]
    pub command: Command,
}
