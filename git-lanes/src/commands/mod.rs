//! Sub-commands of `git-lanes`.

mod log;
mod refs;

use std::path::Path;
use std::sync::Arc;

use lib::core::config::get_graph_unicode;
use lib::core::formatting::Glyphs;
use lib::core::repo_data::RepositoryData;
use lib::git::Repo;
use tracing::instrument;

use crate::opts::{ColorSetting, Command, GlobalArgs, Opts};

/// Represents the code to exit the process with.
#[must_use]
#[derive(Copy, Clone, Debug)]
pub struct ExitCode(pub isize);

/// Either a fatal error, or a non-fatal failure which the user should see as
/// a non-zero exit code.
pub type EyreExitOr<T> = eyre::Result<Result<T, ExitCode>>;

fn choose_glyphs(
    data: &RepositoryData,
    path: &Path,
    color: Option<ColorSetting>,
) -> eyre::Result<Glyphs> {
    let glyphs = match color {
        Some(ColorSetting::Always) => Glyphs::pretty(),
        Some(ColorSetting::Never) => Glyphs::text(),
        Some(ColorSetting::Auto) | None => {
            let repo = Repo::from_dir(path, Arc::clone(data.cache()), data.exit_flag().clone())?;
            Glyphs::from_unicode_setting(get_graph_unicode(&repo)?)
        }
    };
    Ok(glyphs)
}

/// Run the subcommand named by `opts` against the repository in the current
/// directory.
#[instrument]
pub fn command_main(opts: Opts) -> EyreExitOr<()> {
    let Opts {
        global_args: GlobalArgs {
            working_directory: _,
            color,
        },
        command,
    } = opts;

    let path = std::env::current_dir()?;
    let data = RepositoryData::open(&path)?;
    let mut out = std::io::stdout().lock();

    let exit_code = match command {
        Command::Log {
            reference,
            graph,
            max_count,
            filter_options,
        } => {
            let glyphs = choose_glyphs(&data, &path, color)?;
            log::log(
                &mut out,
                &data,
                &glyphs,
                reference.as_deref(),
                graph,
                max_count,
                &filter_options,
            )?
        }

        Command::Refs { filter } => refs::refs(&mut out, &data, filter.as_deref())?,
    };

    data.shutdown();
    Ok(exit_code)
}

#[cfg(test)]
mod testing {
    use lib::git::NonZeroOid;
    use lib::testing::{make_git_repo, GitRepo};

    pub struct MergeRepo {
        pub git: GitRepo,
        pub first: NonZeroOid,
        pub side: NonZeroOid,
        pub second: NonZeroOid,
        pub merge: NonZeroOid,
    }

    /// `main` is a merge of `second` and `side`, both of which build on
    /// `first`. `origin/main` and the tag `v1` point at `first`.
    pub fn make_merge_repo() -> eyre::Result<MergeRepo> {
        let git = make_git_repo()?;
        let first = git.commit(None, "first", 100, &[])?;
        let side = git.commit(None, "side", 150, &[first])?;
        let second = git.commit(None, "second", 200, &[first])?;
        let merge = git.commit(None, "merge", 300, &[second, side])?;
        git.set_reference("refs/heads/main", merge)?;
        git.set_reference("refs/remotes/origin/main", first)?;
        git.set_upstream("main", "origin/main")?;
        git.annotated_tag("v1", first)?;
        git.set_head("refs/heads/main")?;
        Ok(MergeRepo {
            git,
            first,
            side,
            second,
            merge,
        })
    }
}
