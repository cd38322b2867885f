// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{plant, remote_files, remote_refs, FakeHosting, Journal, RecordingVcs};

use anyhow::Result;
use git2::{BranchType, Repository};
use pretty_assertions::assert_eq;
use std::{collections::BTreeSet, path::PathBuf};
use tagroute::{
    config::{RepoSlug, Visibility},
    mirror::{Bootstrap, Gatekeeper, PushOutcome, VersionControl},
};

fn committed_workdir(vcs: &RecordingVcs) -> Result<tempfile::TempDir> {
    let workdir = tempfile::tempdir()?;
    vcs.init(workdir.path())?;
    plant(workdir.path(), &[("post.md", "#blog hello")])?;
    vcs.stage_and_commit(workdir.path(), "snapshot")?;

    Ok(workdir)
}

#[test]
fn stamp_existing_remote_then_push() -> Result<()> {
    let journal = Journal::default();
    let hosting = FakeHosting::new(journal.clone())?;
    let vcs = RecordingVcs::new(journal.clone());
    let remote = RepoSlug::new("acme", "priv");
    hosting.seed(&remote, "Internal tool")?;
    let gate = Gatekeeper::new(&hosting, &vcs, Visibility::Public);

    assert!(!gate.verify_managed(&remote)?);
    assert_eq!(gate.ensure_exists_and_managed(&remote)?, Bootstrap::Stamped);
    assert_eq!(
        hosting.repo(&remote).map(|repo| repo.description),
        Some("Internal tool | Managed by tagroute".to_string())
    );
    assert!(gate.verify_managed(&remote)?);

    // Claiming twice leaves description alone.
    assert_eq!(gate.ensure_exists_and_managed(&remote)?, Bootstrap::AlreadyManaged);
    assert_eq!(
        hosting.repo(&remote).map(|repo| repo.description),
        Some("Internal tool | Managed by tagroute".to_string())
    );

    let workdir = committed_workdir(&vcs)?;
    assert_eq!(gate.guarded_push(workdir.path(), &remote)?, PushOutcome::Pushed);
    assert_eq!(
        remote_files(hosting.remote_path(&remote))?,
        BTreeSet::from([PathBuf::from("post.md")])
    );

    Ok(())
}

#[test]
fn refuse_push_to_unmanaged_remote() -> Result<()> {
    let journal = Journal::default();
    let hosting = FakeHosting::new(journal.clone())?;
    let vcs = RecordingVcs::new(journal.clone());
    let remote = RepoSlug::new("acme", "stranger");
    hosting.seed(&remote, "Somebody else's project")?;
    let gate = Gatekeeper::new(&hosting, &vcs, Visibility::Public);

    let workdir = committed_workdir(&vcs)?;
    assert_eq!(gate.guarded_push(workdir.path(), &remote)?, PushOutcome::Unmanaged);
    assert_eq!(vcs.pushes(), 0);
    assert!(remote_refs(hosting.remote_path(&remote))?.is_empty());

    Ok(())
}

#[test]
fn every_push_follows_marker_read() -> Result<()> {
    let journal = Journal::default();
    let hosting = FakeHosting::new(journal.clone())?;
    let vcs = RecordingVcs::new(journal.clone());
    let remote = RepoSlug::new("acme", "site");
    hosting.seed(&remote, "Managed by tagroute")?;
    let gate = Gatekeeper::new(&hosting, &vcs, Visibility::Public);

    let workdir = committed_workdir(&vcs)?;
    gate.guarded_push(workdir.path(), &remote)?;
    gate.guarded_push(workdir.path(), &remote)?;

    let calls = journal.borrow().clone();
    assert_eq!(vcs.pushes(), 2);
    for (position, call) in calls.iter().enumerate() {
        if call.starts_with("push_mirror") {
            assert!(position > 0);
            assert_eq!(calls[position - 1], "get_description acme/site");
        }
    }

    Ok(())
}

#[test]
fn create_missing_remote_with_marker() -> Result<()> {
    let journal = Journal::default();
    let hosting = FakeHosting::new(journal.clone())?;
    let vcs = RecordingVcs::new(journal.clone());
    let remote = RepoSlug::new("acme", "fresh");
    let gate = Gatekeeper::new(&hosting, &vcs, Visibility::Private);

    assert_eq!(gate.ensure_exists(&remote)?, Bootstrap::Created);
    let created = hosting.repo(&remote).unwrap();
    assert_eq!(created.description, "Managed by tagroute");
    assert_eq!(created.visibility, Visibility::Private);
    assert!(gate.verify_managed(&remote)?);

    Ok(())
}

#[test]
fn ensure_exists_leaves_existing_remote_alone() -> Result<()> {
    let journal = Journal::default();
    let hosting = FakeHosting::new(journal.clone())?;
    let vcs = RecordingVcs::new(journal.clone());
    let remote = RepoSlug::new("acme", "old");
    hosting.seed(&remote, "Hands off")?;
    let gate = Gatekeeper::new(&hosting, &vcs, Visibility::Public);

    assert_eq!(gate.ensure_exists(&remote)?, Bootstrap::Existing);
    assert!(!gate.verify_managed(&remote)?);
    assert_eq!(
        hosting.repo(&remote).map(|repo| repo.description),
        Some("Hands off".to_string())
    );
    assert!(!journal
        .borrow()
        .iter()
        .any(|call| call.starts_with("set_description") || call.starts_with("create")));

    Ok(())
}

#[test]
fn mirror_push_deletes_remote_only_refs() -> Result<()> {
    let journal = Journal::default();
    let hosting = FakeHosting::new(journal.clone())?;
    let vcs = RecordingVcs::new(journal.clone());
    let remote = RepoSlug::new("acme", "mirror");
    hosting.seed(&remote, "Managed by tagroute")?;
    let gate = Gatekeeper::new(&hosting, &vcs, Visibility::Public);

    let workdir = committed_workdir(&vcs)?;
    {
        let repo = Repository::open(workdir.path())?;
        let head = repo.head()?.peel_to_commit()?;
        repo.branch("feature", &head, false)?;
    }
    gate.guarded_push(workdir.path(), &remote)?;
    assert_eq!(
        remote_refs(hosting.remote_path(&remote))?,
        BTreeSet::from([
            "refs/heads/feature".to_string(),
            "refs/heads/main".to_string()
        ])
    );

    {
        let repo = Repository::open(workdir.path())?;
        repo.find_branch("feature", BranchType::Local)?.delete()?;
    }
    gate.guarded_push(workdir.path(), &remote)?;
    assert_eq!(
        remote_refs(hosting.remote_path(&remote))?,
        BTreeSet::from(["refs/heads/main".to_string()])
    );

    Ok(())
}
