//! `git-lanes log`: show the history of one reference.

use std::io::Write;

use lib::core::commit_set::commit_predicate;
use lib::core::formatting::Glyphs;
use lib::core::repo_data::RepositoryData;
use lib::git::{Reference, ReferenceName, HEAD_REFERENCE_NAME};
use tracing::instrument;

use crate::commands::{ExitCode, EyreExitOr};
use crate::opts::FilterOptions;

/// Find the reference the user means by `name`, trying the usual prefixes
/// like `git rev-parse` does.
fn resolve_reference(data: &RepositoryData, name: Option<&str>) -> Option<Reference> {
    let references = data.references();
    match name {
        None | Some(HEAD_REFERENCE_NAME) => references.head(),
        Some(name) => ["", "refs/heads/", "refs/remotes/", "refs/tags/"]
            .iter()
            .find_map(|prefix| references.find(&ReferenceName::from(format!("{prefix}{name}")))),
    }
}

/// Print the (optionally filtered) history of `reference_name`, newest
/// first.
#[instrument(skip(out, data, glyphs))]
pub fn log(
    out: &mut impl Write,
    data: &RepositoryData,
    glyphs: &Glyphs,
    reference_name: Option<&str>,
    graph: bool,
    max_count: Option<usize>,
    filter_options: &FilterOptions,
) -> EyreExitOr<()> {
    data.refresh_references()?;
    let reference = match resolve_reference(data, reference_name) {
        Some(reference) => reference,
        None => {
            writeln!(
                out,
                "No such branch or tag: {}",
                reference_name.unwrap_or(HEAD_REFERENCE_NAME)
            )?;
            return Ok(Err(ExitCode(1)));
        }
    };

    let registry = data.registry();
    let name = reference.get_name();
    registry.load_history(&reference)?;

    let FilterOptions { author, grep } = filter_options;
    if let Some(author) = author {
        let author = author.clone();
        registry.add_filter(
            name,
            commit_predicate(move |commit| {
                let signature = commit.get_author();
                signature.get_name().contains(&author) || signature.get_email().contains(&author)
            }),
        )?;
    }
    if let Some(grep) = grep {
        let grep = grep.clone();
        registry.add_filter(
            name,
            commit_predicate(move |commit| commit.get_message().contains(&grep)),
        )?;
    }

    let state = registry.state(name)?;
    if state.filter_info.is_some() {
        writeln!(out, "{}", state.describe())?;
    }

    let commits = registry.commits_window(name, 0, max_count.unwrap_or(usize::MAX))?;
    if graph {
        let graph = registry.graph(name)?;
        for (row, commit) in graph.rows().iter().zip(&commits) {
            writeln!(out, "{} {}", row.render(glyphs), commit.friendly_describe())?;
        }
    } else {
        for commit in &commits {
            writeln!(out, "{}", commit.friendly_describe())?;
        }
    }

    Ok(Ok(()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{make_merge_repo, MergeRepo};

    fn run_log(
        data: &RepositoryData,
        reference_name: Option<&str>,
        graph: bool,
        max_count: Option<usize>,
        filter_options: &FilterOptions,
    ) -> eyre::Result<(String, Option<isize>)> {
        let mut out = Vec::new();
        let result = log(
            &mut out,
            data,
            &Glyphs::text(),
            reference_name,
            graph,
            max_count,
            filter_options,
        )?;
        let exit_code = result.err().map(|ExitCode(exit_code)| exit_code);
        Ok((String::from_utf8(out)?, exit_code))
    }

    #[test]
    fn test_log_graph() -> eyre::Result<()> {
        let MergeRepo {
            git,
            first,
            side,
            second,
            merge,
        } = make_merge_repo()?;
        let data = RepositoryData::open(git.path())?;

        let (output, exit_code) = run_log(&data, None, true, None, &Default::default())?;
        assert_eq!(exit_code, None);
        assert_eq!(
            output,
            format!(
                "M-. {} merge\no | {} second\n| o {} side\no-' {} first\n",
                merge.to_short_string(),
                second.to_short_string(),
                side.to_short_string(),
                first.to_short_string(),
            )
        );

        let (output, _) = run_log(&data, Some("main"), false, Some(2), &Default::default())?;
        assert_eq!(
            output,
            format!(
                "{} merge\n{} second\n",
                merge.to_short_string(),
                second.to_short_string(),
            )
        );
        Ok(())
    }

    #[test]
    fn test_log_filters() -> eyre::Result<()> {
        let MergeRepo { git, side, .. } = make_merge_repo()?;
        let data = RepositoryData::open(git.path())?;

        let (output, _) = run_log(
            &data,
            Some("main"),
            false,
            None,
            &FilterOptions {
                author: Some("Testy".to_string()),
                grep: Some("si".to_string()),
            },
        )?;
        assert_eq!(
            output,
            format!(
                "2 filters reduced 4 commits to 1\n{} side\n",
                side.to_short_string()
            )
        );
        Ok(())
    }

    #[test]
    fn test_log_graph_with_filter() -> eyre::Result<()> {
        let MergeRepo { git, side, .. } = make_merge_repo()?;
        let data = RepositoryData::open(git.path())?;

        let (output, _) = run_log(
            &data,
            Some("main"),
            true,
            None,
            &FilterOptions {
                author: None,
                grep: Some("side".to_string()),
            },
        )?;
        assert_eq!(
            output,
            format!(
                "filter reduced 4 commits to 1\n| o {} side\n",
                side.to_short_string()
            )
        );
        Ok(())
    }

    #[test]
    fn test_log_other_references() -> eyre::Result<()> {
        let MergeRepo { git, first, .. } = make_merge_repo()?;
        let data = RepositoryData::open(git.path())?;

        let (output, _) = run_log(&data, Some("origin/main"), false, None, &Default::default())?;
        assert_eq!(output, format!("{} first\n", first.to_short_string()));
        let (output, _) = run_log(&data, Some("refs/tags/v1"), false, None, &Default::default())?;
        assert_eq!(output, format!("{} first\n", first.to_short_string()));

        let (output, exit_code) = run_log(&data, Some("nope"), false, None, &Default::default())?;
        insta::assert_snapshot!(output, @"No such branch or tag: nope");
        assert_eq!(exit_code, Some(1));
        Ok(())
    }
}
