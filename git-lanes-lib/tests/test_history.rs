use std::sync::Arc;

use itertools::Itertools;
use lanes::core::cache::CommitCache;
use lanes::core::commit_set::{commit_predicate, HistoryPatch};
use lanes::core::config::HistoryConfig;
use lanes::core::formatting::Glyphs;
use lanes::core::history::{Error, HistoryRegistry};
use lanes::git::{Reference, ReferenceName, UpdatedReference};
use lanes::testing::{fake_oid, make_authored_commit, make_commit, FakeCommitSource};

/// A repository where `c1..c5` are linear, `c6` and `c7` build on `c5`, `c8`
/// and `c9` build on `c3`, and `c20` is an unrelated root.
fn make_source() -> Arc<FakeCommitSource> {
    let source = FakeCommitSource::new(Arc::new(CommitCache::new()));
    source.add_commits([
        make_commit(1, &[], 10),
        make_commit(2, &[1], 20),
        make_commit(3, &[2], 30),
        make_commit(4, &[3], 40),
        make_commit(5, &[4], 50),
        make_commit(6, &[5], 60),
        make_commit(7, &[6], 70),
        make_commit(8, &[3], 80),
        make_commit(9, &[8], 90),
        make_commit(20, &[], 200),
    ]);
    Arc::new(source)
}

fn make_registry(source: &Arc<FakeCommitSource>) -> HistoryRegistry {
    HistoryRegistry::new(
        Arc::clone(source) as _,
        Arc::clone(source.cache()),
        HistoryConfig::default(),
    )
}

fn main_at(id: u32) -> Reference {
    Reference::local_branch("refs/heads/main", fake_oid(id))
}

fn main_name() -> ReferenceName {
    ReferenceName::from("refs/heads/main")
}

fn summaries(registry: &HistoryRegistry) -> eyre::Result<Vec<String>> {
    Ok(registry
        .commits_window(&main_name(), 0, usize::MAX)?
        .iter()
        .map(|commit| commit.get_summary().to_owned())
        .collect())
}

#[test]
fn test_load_history() -> eyre::Result<()> {
    let source = make_source();
    let registry = make_registry(&source);
    let commits = registry.load_history(&main_at(5))?;

    assert!(!commits.is_loading());
    insta::assert_debug_snapshot!(summaries(&registry)?, @r###"
    [
        "commit 5",
        "commit 4",
        "commit 3",
        "commit 2",
        "commit 1",
    ]
    "###);
    assert_eq!(
        registry
            .commit_at_index(&main_name(), 1)?
            .map(|commit| commit.get_oid()),
        Some(fake_oid(4))
    );
    assert_eq!(registry.commit_at_index(&main_name(), 5)?, None);
    assert_eq!(registry.state(&main_name())?.describe(), "5 commits");
    Ok(())
}

#[test]
fn test_missing_history_and_filter_errors() -> eyre::Result<()> {
    let source = make_source();
    let registry = make_registry(&source);

    assert!(matches!(
        registry.state(&main_name()),
        Err(Error::NoHistory { .. })
    ));
    assert!(matches!(
        registry.add_filter(&main_name(), commit_predicate(|_| true)),
        Err(Error::NoHistory { .. })
    ));

    registry.load_history(&main_at(5))?;
    assert!(matches!(
        registry.remove_filter(&main_name()),
        Err(Error::NoFilterApplied { .. })
    ));
    Ok(())
}

#[test]
fn test_filters_through_registry() -> eyre::Result<()> {
    let source = FakeCommitSource::new(Arc::new(CommitCache::new()));
    source.add_commits([
        make_authored_commit(1, &[], 10, "alice", "initial"),
        make_authored_commit(2, &[1], 20, "bob", "add parser"),
        make_authored_commit(3, &[2], 30, "alice", "fix parser"),
        make_authored_commit(4, &[3], 40, "bob", "fix lexer"),
    ]);
    let source = Arc::new(source);
    let registry = make_registry(&source);
    registry.load_history(&main_at(4))?;

    registry.add_filter(
        &main_name(),
        commit_predicate(|commit| commit.get_summary().contains("fix")),
    )?;
    registry.add_filter(
        &main_name(),
        commit_predicate(|commit| commit.get_author().get_name() == "alice"),
    )?;
    assert_eq!(summaries(&registry)?, vec!["fix parser"]);
    assert_eq!(
        registry.state(&main_name())?.describe(),
        "2 filters reduced 4 commits to 1"
    );

    registry.remove_filter(&main_name())?;
    registry.remove_filter(&main_name())?;
    assert_eq!(registry.state(&main_name())?.describe(), "4 commits");
    Ok(())
}

#[test]
fn test_source_error_keeps_partial_history() -> eyre::Result<()> {
    let source = make_source();
    source.fail_walks_after(2);
    let registry = make_registry(&source);

    let result = registry.load_history(&main_at(5));
    assert!(matches!(result, Err(Error::Source(_))));
    let commits = registry.history(&main_name()).unwrap();
    assert_eq!(commits.len(), 2);
    assert!(!commits.is_loading());
    Ok(())
}

#[test]
fn test_exiting_stops_load() -> eyre::Result<()> {
    let source = make_source();
    source.exit_flag().raise();
    let registry = make_registry(&source);

    let commits = registry.load_history(&main_at(5))?;
    assert!(commits.is_empty());
    assert!(!commits.is_loading());
    Ok(())
}

#[test]
fn test_spawn_load_and_reload_all() -> eyre::Result<()> {
    let source = make_source();
    let registry = Arc::new(make_registry(&source));

    let handle = registry.spawn_load_history(main_at(7));
    let commits = handle.join().unwrap()?;
    assert_eq!(commits.len(), 7);

    let results = registry.reload_all(&[
        main_at(9),
        Reference::tag("refs/tags/other", fake_oid(20)),
    ])?;
    let lengths: Vec<usize> = results
        .into_iter()
        .map_ok(|commits| commits.len())
        .try_collect()?;
    assert_eq!(lengths, vec![5, 1]);
    assert_eq!(registry.reference(&main_name()), Some(main_at(9)));
    Ok(())
}

#[test]
fn test_patch_fast_forward() -> eyre::Result<()> {
    let source = make_source();
    let registry = make_registry(&source);
    let commits = registry.load_history(&main_at(5))?;

    let patch = registry.apply_update(&UpdatedReference {
        old: main_at(5),
        new: main_at(7),
    })?;
    assert_eq!(
        patch,
        Some(HistoryPatch {
            start: 0,
            removed: 0,
            inserted: 2,
        })
    );
    insta::assert_debug_snapshot!(summaries(&registry)?, @r###"
    [
        "commit 7",
        "commit 6",
        "commit 5",
        "commit 4",
        "commit 3",
        "commit 2",
        "commit 1",
    ]
    "###);
    for (newer, older) in commits.stream().tuple_windows() {
        assert!(newer.get_time() >= older.get_time());
    }
    assert_eq!(registry.reference(&main_name()), Some(main_at(7)));
    Ok(())
}

#[test]
fn test_patch_rebase_keeps_filters() -> eyre::Result<()> {
    let source = make_source();
    let registry = make_registry(&source);
    registry.load_history(&main_at(5))?;
    registry.add_filter(
        &main_name(),
        commit_predicate(|commit| commit.get_time().seconds() % 20 != 0),
    )?;
    assert_eq!(summaries(&registry)?, vec!["commit 5", "commit 3", "commit 1"]);

    let patch = registry.apply_update(&UpdatedReference {
        old: main_at(5),
        new: main_at(9),
    })?;
    assert_eq!(
        patch,
        Some(HistoryPatch {
            start: 0,
            removed: 1,
            inserted: 1,
        })
    );
    assert_eq!(summaries(&registry)?, vec!["commit 9", "commit 3", "commit 1"]);

    registry.remove_filter(&main_name())?;
    assert_eq!(
        summaries(&registry)?,
        vec!["commit 9", "commit 8", "commit 3", "commit 2", "commit 1"]
    );
    Ok(())
}

#[test]
fn test_patch_unrelated_history_replaces_everything() -> eyre::Result<()> {
    let source = make_source();
    let registry = make_registry(&source);
    registry.load_history(&main_at(5))?;

    let patch = registry.apply_update(&UpdatedReference {
        old: main_at(5),
        new: main_at(20),
    })?;
    assert_eq!(
        patch,
        Some(HistoryPatch {
            start: 0,
            removed: 5,
            inserted: 1,
        })
    );
    assert_eq!(summaries(&registry)?, vec!["commit 20"]);
    Ok(())
}

#[test]
fn test_stale_or_unknown_update_is_skipped() -> eyre::Result<()> {
    let source = make_source();
    let registry = make_registry(&source);

    let unknown = registry.apply_update(&UpdatedReference {
        old: main_at(5),
        new: main_at(7),
    })?;
    assert_eq!(unknown, None);

    registry.load_history(&main_at(5))?;
    let stale = registry.apply_update(&UpdatedReference {
        old: main_at(4),
        new: main_at(7),
    })?;
    assert_eq!(stale, None);
    assert_eq!(registry.history(&main_name()).unwrap().len(), 5);
    Ok(())
}

#[test]
fn test_patch_with_many_same_timestamp_commits() -> eyre::Result<()> {
    // Twenty commits sharing one timestamp, with a branch forking off each of
    // them in turn.
    let source = FakeCommitSource::new(Arc::new(CommitCache::new()));
    source.add_commit(make_commit(1, &[], 10));
    for id in 2..=21 {
        source.add_commit(make_commit(id, &[id - 1], 100));
    }
    source.add_commit(make_commit(22, &[21], 200));
    for fork_point in 2..=21u32 {
        source.add_commit(make_commit(1000 + fork_point, &[fork_point], 300));
    }
    let source = Arc::new(source);

    for fork_point in 2..=21u32 {
        let registry = make_registry(&source);
        let commits = registry.load_history(&main_at(22))?;
        let expected_ancestor_index = commits.position(fake_oid(fork_point)).unwrap();

        let patch = registry
            .apply_update(&UpdatedReference {
                old: main_at(22),
                new: main_at(1000 + fork_point),
            })?
            .unwrap();
        assert_eq!(patch.removed, expected_ancestor_index);
        assert_eq!(patch.inserted, 1);
        assert_eq!(commits.commit_at(1).unwrap().get_oid(), fake_oid(fork_point));
        assert_eq!(commits.len(), 22 - expected_ancestor_index + 1);
    }
    Ok(())
}

#[test]
fn test_forget_and_graph() -> eyre::Result<()> {
    let source = make_source();
    let registry = make_registry(&source);
    registry.load_history(&main_at(3))?;

    let graph = registry.graph(&main_name())?;
    let rendered = graph
        .rows()
        .iter()
        .map(|row| row.render(&Glyphs::text()))
        .collect_vec();
    assert_eq!(rendered, vec!["o", "o", "o"]);

    registry.add_filter(
        &main_name(),
        commit_predicate(|commit| commit.get_time().seconds() != 20),
    )?;
    let graph = registry.graph(&main_name())?;
    assert_eq!(graph.row_count(), 2);
    assert_eq!(graph.lane_count(), 0);

    assert!(registry.forget(&main_name()));
    assert!(!registry.forget(&main_name()));
    assert!(matches!(
        registry.graph(&main_name()),
        Err(Error::NoHistory { .. })
    ));
    Ok(())
}
