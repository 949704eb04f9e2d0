use std::sync::Arc;

use itertools::Itertools;
use lanes::core::commit_set::{commit_predicate, CommitSet, CommitSetState, FilterInfo, HistoryPatch};
use lanes::core::graph::CellType;
use lanes::core::history::Error;
use lanes::git::Commit;
use lanes::testing::{make_authored_commit, make_commit};

/// Commits `n` down to `1`, each the parent of the previous one, ten seconds
/// apart.
fn linear_history(n: u32) -> Vec<Arc<Commit>> {
    (1..=n)
        .rev()
        .map(|id| {
            let parents = if id > 1 { vec![id - 1] } else { vec![] };
            Arc::new(make_commit(id, &parents, i64::from(id) * 10))
        })
        .collect()
}

fn summaries(set: &CommitSet) -> Vec<String> {
    set.stream()
        .map(|commit| commit.get_summary().to_owned())
        .collect()
}

#[test]
fn test_add_commit_requires_loading() {
    let set = CommitSet::new();
    for commit in linear_history(3) {
        set.add_commit(commit).unwrap();
    }
    assert!(set.is_loading());
    set.set_loading(false);

    let result = set.add_commit(Arc::new(make_commit(9, &[], 0)));
    assert!(matches!(result, Err(Error::NotLoading)));
    assert_eq!(
        set.state(),
        CommitSetState {
            loading: false,
            commit_num: 3,
            filter_info: None,
        }
    );
    assert_eq!(set.state().describe(), "3 commits");
}

#[test]
fn test_commit_at_and_window() {
    let set = CommitSet::from_commits(linear_history(5));
    assert_eq!(
        set.commit_at(0).map(|commit| commit.get_summary().to_owned()),
        Some("commit 5".to_owned())
    );
    assert!(set.commit_at(5).is_none());
    insta::assert_debug_snapshot!(
        set.commits_window(3, 10)
            .iter()
            .map(|commit| commit.get_summary())
            .collect_vec(),
        @r###"
    [
        "commit 2",
        "commit 1",
    ]
    "###);
    assert!(set.commits_window(7, 2).is_empty());
}

#[test]
fn test_history_is_ordered_by_date() {
    let set = CommitSet::from_commits(linear_history(20));
    for (newer, older) in set.stream().tuple_windows() {
        assert!(newer.get_time() >= older.get_time());
    }
}

#[test]
fn test_stream_restarts_and_sees_appends() {
    let set = CommitSet::new();
    let history = linear_history(4);
    set.add_commit(Arc::clone(&history[0])).unwrap();
    set.add_commit(Arc::clone(&history[1])).unwrap();

    let mut stream = set.stream();
    assert_eq!(stream.next().map(|commit| commit.get_oid()), Some(history[0].get_oid()));

    set.add_commit(Arc::clone(&history[2])).unwrap();
    set.add_commit(Arc::clone(&history[3])).unwrap();
    assert_eq!(stream.count(), 3);

    // A new call starts over from the newest commit.
    assert_eq!(set.stream().count(), 4);
}

#[test]
fn test_concurrent_readers_see_growing_history() {
    let set = CommitSet::new();
    let history = linear_history(200);
    crossbeam::thread::scope(|scope| {
        scope.spawn(|_| {
            for commit in &history {
                set.add_commit(Arc::clone(commit)).unwrap();
            }
            set.set_loading(false);
        });
        scope.spawn(|_| {
            let mut last_len = 0;
            while set.is_loading() {
                let len = set.len();
                assert!(len >= last_len);
                if let Some(commit) = set.commit_at(len.saturating_sub(1)) {
                    assert!(history.iter().any(|expected| Arc::ptr_eq(expected, &commit)));
                }
                last_len = len;
            }
        });
    })
    .unwrap();
    assert_eq!(set.len(), 200);
}

#[test]
fn test_filter_is_reversible() {
    let set = CommitSet::from_commits(linear_history(10));
    let before = summaries(&set);

    set.add_filter(commit_predicate(|commit| commit.get_time().seconds() > 50));
    assert_eq!(set.len(), 5);
    assert!(set.remove_filter());

    assert_eq!(summaries(&set), before);
    assert_eq!(set.state().filter_info, None);
    assert!(!set.remove_filter());
}

#[test]
fn test_filters_compose() {
    let commits = (1..=10u32).rev().map(|id| {
        let author = if id % 2 == 0 { "alice" } else { "bob" };
        let message = if id % 3 == 0 {
            format!("fix {id}")
        } else {
            format!("feature {id}")
        };
        Arc::new(make_authored_commit(id, &[], i64::from(id), author, &message))
    });
    let set = CommitSet::from_commits(commits);

    set.add_filter(commit_predicate(|commit| {
        commit.get_author().get_name() == "alice"
    }));
    insta::assert_debug_snapshot!(summaries(&set), @r###"
    [
        "feature 10",
        "feature 8",
        "fix 6",
        "feature 4",
        "feature 2",
    ]
    "###);
    assert_eq!(set.state().describe(), "filter reduced 10 commits to 5");

    set.add_filter(commit_predicate(|commit| commit.get_message().starts_with("fix")));
    assert_eq!(summaries(&set), vec!["fix 6"]);
    assert_eq!(
        set.state().filter_info,
        Some(FilterInfo {
            unfiltered_commit_num: 10,
            filters_applied: 2,
        })
    );
    assert_eq!(set.state().describe(), "2 filters reduced 10 commits to 1");
}

#[test]
fn test_filter_applies_to_later_commits() {
    let set = CommitSet::new();
    let history = linear_history(6);
    for commit in &history[..3] {
        set.add_commit(Arc::clone(commit)).unwrap();
    }
    set.add_filter(commit_predicate(|commit| commit.get_time().seconds() % 20 == 0));
    for commit in &history[3..] {
        set.add_commit(Arc::clone(commit)).unwrap();
    }
    set.set_loading(false);

    assert_eq!(summaries(&set), vec!["commit 6", "commit 4", "commit 2"]);
    // The unfiltered count is the one seen when the filter went on.
    assert_eq!(set.state().describe(), "filter reduced 3 commits to 3");
    assert!(set.remove_filter());
    assert_eq!(set.len(), 6);
    assert_eq!(set.state().describe(), "6 commits");

    set.add_filter(commit_predicate(|commit| commit.get_time().seconds() > 30));
    assert_eq!(set.state().describe(), "filter reduced 6 commits to 3");
}

#[test]
fn test_splice_fast_forward() {
    // History of the old value `c3`, as it was loaded.
    let set = CommitSet::from_commits(linear_history(5));
    let c6 = Arc::new(make_commit(6, &[5], 60));

    set.set_loading(true);
    let patch = set.splice_front(0, &[c6]).unwrap();
    set.set_loading(false);

    assert_eq!(
        patch,
        HistoryPatch {
            start: 0,
            removed: 0,
            inserted: 1,
        }
    );
    insta::assert_debug_snapshot!(summaries(&set), @r###"
    [
        "commit 6",
        "commit 5",
        "commit 4",
        "commit 3",
        "commit 2",
        "commit 1",
    ]
    "###);
}

#[test]
fn test_splice_through_filters() {
    let set = CommitSet::from_commits(linear_history(5));
    set.add_filter(commit_predicate(|commit| commit.get_time().seconds() % 20 == 0));
    assert_eq!(summaries(&set), vec!["commit 4", "commit 2"]);

    let replacements = vec![
        Arc::new(make_commit(7, &[6], 70)),
        Arc::new(make_commit(6, &[3], 60)),
    ];
    set.set_loading(true);
    let patch = set.splice_front(2, &replacements).unwrap();
    set.set_loading(false);

    assert_eq!(
        patch,
        HistoryPatch {
            start: 0,
            removed: 1,
            inserted: 1,
        }
    );
    assert_eq!(summaries(&set), vec!["commit 6", "commit 2"]);
    assert_eq!(set.state().describe(), "filter reduced 5 commits to 2");

    assert!(set.remove_filter());
    assert_eq!(
        summaries(&set),
        vec!["commit 7", "commit 6", "commit 3", "commit 2", "commit 1"]
    );
}

#[test]
fn test_splice_requires_loading() {
    let set = CommitSet::from_commits(linear_history(3));
    let result = set.splice_front(1, &[Arc::new(make_commit(4, &[3], 40))]);
    assert!(matches!(result, Err(Error::NotLoading)));
    assert_eq!(set.len(), 3);
}

#[test]
fn test_position_after_splice() {
    let history = linear_history(4);
    let set = CommitSet::from_commits(history.clone());
    assert_eq!(set.position(history[2].get_oid()), Some(2));

    set.set_loading(true);
    let replacement = Arc::new(make_commit(8, &[3], 80));
    set.splice_front(1, &[Arc::clone(&replacement)]).unwrap();
    set.set_loading(false);
    assert_eq!(set.position(replacement.get_oid()), Some(0));
    assert_eq!(set.position(history[2].get_oid()), Some(2));
    assert_eq!(set.position(history[0].get_oid()), None);
}

#[test]
fn test_graph_of_filtered_history_closes_lanes() {
    let set = CommitSet::from_commits(linear_history(20));
    set.add_filter(commit_predicate(|commit| commit.get_time().seconds() % 20 == 0));
    assert_eq!(set.len(), 10);

    let graph = set.graph();
    assert_eq!(graph.row_count(), 10);
    for row in graph.rows() {
        assert_eq!(row.cells(), &[CellType::Commit]);
    }
    assert_eq!(graph.lane_count(), 0);
}
