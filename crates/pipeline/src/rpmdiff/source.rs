//! RPM artifact source backed by the `dnf` command line.
//!
//! Every call addresses the descriptor's repository as a temporary repo
//! (`--repofrompath`) with all system repositories disabled, so only that
//! repository's inventory is visible.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use archdiffer_core::comparison::{ArtifactCandidate, ArtifactDescriptor};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::plugin::{ArtifactSource, PluginError};
use crate::process::{run_program, ProcedureOutput};

/// `dnf repoquery` output format: one tab-separated candidate per line.
const QUERY_FORMAT: &str = "%{name}\t%{epoch}\t%{version}\t%{release}\t%{arch}\t%{location}\n";

/// Stable repo id for a repository locator.
pub fn repository_label(repository: &str) -> String {
    let digest = Sha256::digest(repository.as_bytes());
    let hex: String = digest[..6].iter().map(|b| format!("{b:02x}")).collect();
    format!("archdiffer-{hex}")
}

/// Parse `repoquery` output produced with [`QUERY_FORMAT`].
fn parse_inventory(stdout: &[u8]) -> Result<Vec<ArtifactCandidate>, PluginError> {
    let text = String::from_utf8_lossy(stdout);
    let mut candidates = Vec::new();
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let fields: Vec<&str> = line.split('\t').collect();
        let [name, epoch, version, release, arch, location] = fields[..] else {
            return Err(PluginError::Fetch(format!("unexpected repoquery line: {line}")));
        };
        candidates.push(ArtifactCandidate {
            name: name.to_string(),
            epoch: epoch.to_string(),
            version: version.to_string(),
            release: release.to_string(),
            arch: arch.to_string(),
            location: location.to_string(),
        });
    }
    Ok(candidates)
}

#[derive(Debug, Clone)]
pub struct DnfRepositorySource {
    program: String,
}

impl DnfRepositorySource {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn repo_args(repository: &str) -> Vec<OsString> {
        let label = repository_label(repository);
        vec![
            "--quiet".into(),
            "--disablerepo=*".into(),
            format!("--repofrompath={label},{repository}").into(),
            format!("--enablerepo={label}").into(),
            format!("--setopt={label}.gpgcheck=0").into(),
        ]
    }

    async fn run(&self, args: Vec<OsString>) -> Result<ProcedureOutput, PluginError> {
        let output = run_program(&self.program, &args)
            .await
            .map_err(|e| PluginError::Fetch(format!("failed to run {}: {e}", self.program)))?;
        if output.exit_code != Some(0) {
            return Err(PluginError::Fetch(format!(
                "{} exited with {:?}: {}",
                self.program,
                output.exit_code,
                output.stderr_lossy()
            )));
        }
        Ok(output)
    }
}

#[async_trait]
impl ArtifactSource for DnfRepositorySource {
    async fn resolve(
        &self,
        descriptor: &ArtifactDescriptor,
    ) -> Result<Vec<ArtifactCandidate>, PluginError> {
        let mut args: Vec<OsString> = vec!["repoquery".into()];
        args.extend(Self::repo_args(&descriptor.repository));
        args.push("--queryformat".into());
        args.push(QUERY_FORMAT.into());
        args.push(descriptor.name.clone().into());

        let output = self.run(args).await?;
        let candidates = parse_inventory(&output.stdout)?;
        tracing::debug!(
            name = %descriptor.name,
            repository = %descriptor.repository,
            count = candidates.len(),
            "Repository queried",
        );
        Ok(candidates)
    }

    async fn materialize(
        &self,
        candidate: &ArtifactCandidate,
        descriptor: &ArtifactDescriptor,
        dir: &Path,
    ) -> Result<PathBuf, PluginError> {
        let mut args: Vec<OsString> = vec!["download".into()];
        args.extend(Self::repo_args(&descriptor.repository));
        args.push("--destdir".into());
        args.push(dir.as_os_str().to_owned());
        args.push(candidate.nevra().into());

        self.run(args).await?;

        let path = dir.join(candidate.file_name());
        if !path.is_file() {
            return Err(PluginError::Fetch(format!(
                "download finished but {} is missing",
                path.display()
            )));
        }
        tracing::debug!(nevra = %candidate.nevra(), path = %path.display(), "Package downloaded");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_stable_and_distinct() {
        let a = repository_label("http://mirror.example/fedora/26/");
        assert_eq!(a, repository_label("http://mirror.example/fedora/26/"));
        assert_ne!(a, repository_label("http://mirror.example/fedora/27/"));
        assert!(a.starts_with("archdiffer-"));
        assert_eq!(a.len(), "archdiffer-".len() + 12);
    }

    #[test]
    fn parses_repoquery_inventory() {
        let out = b"python3\t0\t3.6.1\t8.fc26\tx86_64\tPackages/p/python3-3.6.1-8.fc26.x86_64.rpm\n\
python3\t0\t3.6.1\t8.fc26\ti686\tPackages/p/python3-3.6.1-8.fc26.i686.rpm\n";
        let candidates = parse_inventory(out).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[1].arch, "i686");
        assert_eq!(candidates[0].file_name(), "python3-3.6.1-8.fc26.x86_64.rpm");
    }

    #[test]
    fn malformed_inventory_is_a_fetch_error() {
        let err = parse_inventory(b"python3 3.6.1\n").unwrap_err();
        assert!(matches!(err, PluginError::Fetch(_)));
    }

    #[tokio::test]
    async fn missing_dnf_is_a_fetch_error() {
        let source = DnfRepositorySource::new("archdiffer-no-such-dnf");
        let descriptor = ArtifactDescriptor {
            name: "python3".into(),
            arch: String::new(),
            epoch: String::new(),
            version: String::new(),
            release: String::new(),
            repository: "http://mirror.example/".into(),
        };
        let err = source.resolve(&descriptor).await.unwrap_err();
        assert!(matches!(err, PluginError::Fetch(_)));
    }
}
