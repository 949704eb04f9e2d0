//! `git-lanes refs`: list branches and tags.

use std::fmt::Write as _;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{unbounded, Sender};
use lib::core::references::ReferenceListener;
use lib::core::repo_data::RepositoryData;
use lib::git::{AheadBehind, CategorizedReferenceName, Reference, ReferenceKind};
use tracing::{instrument, warn};

use crate::commands::EyreExitOr;

/// How long to wait for ahead/behind counts before listing without them.
const TRACKING_TIMEOUT: Duration = Duration::from_secs(10);

struct TrackingListener {
    sender: Sender<()>,
}

impl ReferenceListener for TrackingListener {
    fn on_tracking_branches_updated(&self, _branches: &[Reference]) {
        // The receiver is gone if listing already timed out.
        let _ = self.sender.send(());
    }
}

fn describe(reference: &Reference) -> eyre::Result<String> {
    let marker = if reference.is_head() { '*' } else { ' ' };
    let mut line = format!(
        "{marker} {} {}",
        reference.get_shorthand(),
        reference.get_oid().to_short_string()
    );
    if let Some(upstream) = reference.get_upstream() {
        let upstream = CategorizedReferenceName::new(upstream).render_suffix();
        match reference.get_ahead_behind() {
            Some(AheadBehind { ahead, behind }) => {
                write!(line, " [{upstream}: ahead {ahead}, behind {behind}]")?
            }
            None => write!(line, " [{upstream}]")?,
        }
    }
    Ok(line)
}

/// List references, grouped by kind. Tracking branches show how far they
/// have diverged from their upstream.
#[instrument(skip(out, data))]
pub fn refs(out: &mut impl Write, data: &RepositoryData, filter: Option<&str>) -> EyreExitOr<()> {
    let references = data.references();
    let (sender, receiver) = unbounded();
    references.add_listener(Arc::new(TrackingListener { sender }));
    data.refresh_references()?;
    if receiver.recv_timeout(TRACKING_TIMEOUT).is_err() {
        warn!(timeout = ?TRACKING_TIMEOUT, "Timed out computing ahead/behind counts");
    }

    let listed = match filter {
        Some(filter) => references.filtered(|rendered| rendered.contains(filter)),
        None => references.references(),
    };
    if listed.is_empty() {
        writeln!(out, "No matching branches or tags.")?;
        return Ok(Ok(()));
    }

    let mut local_branches = Vec::new();
    let mut remote_branches = Vec::new();
    let mut tags = Vec::new();
    for reference in listed {
        match reference.get_kind() {
            ReferenceKind::LocalBranch { .. } => local_branches.push(reference),
            ReferenceKind::RemoteBranch => remote_branches.push(reference),
            ReferenceKind::Tag => tags.push(reference),
            ReferenceKind::DetachedHead => {
                writeln!(out, "{}", reference.friendly_describe())?;
            }
        }
    }

    for (title, section) in [
        ("Local branches", local_branches),
        ("Remote branches", remote_branches),
        ("Tags", tags),
    ] {
        if section.is_empty() {
            continue;
        }
        writeln!(out, "{title}:")?;
        for reference in &section {
            writeln!(out, "{}", describe(reference)?)?;
        }
    }

    Ok(Ok(()))
}
