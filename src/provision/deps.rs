//! Dependency prober - checks required system tools and installs the
//! ones the OS package source can provide.

use crate::error::{IssuerError, Result};
use crate::exec::{CommandSpec, Executor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Dotted numeric version (`1.22.3`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Finds the first dotted number in free-form tool output, e.g.
    /// `go version go1.22.3 linux/amd64` or `Redis server v=7.0.15 sha=...`.
    pub fn extract(text: &str) -> Option<Self> {
        let bytes = text.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if !bytes[i].is_ascii_digit() {
                i += 1;
                continue;
            }
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                i += 1;
            }
            let token = text[start..i].trim_end_matches('.');
            if token.contains('.') {
                if let Some(version) = Self::parse(token) {
                    return Some(version);
                }
            }
        }
        None
    }

    fn parse(token: &str) -> Option<Self> {
        let mut parts = token.split('.').map(|p| p.parse::<u64>());
        let major = parts.next()?.ok()?;
        let minor = parts.next().unwrap_or(Ok(0)).ok()?;
        let patch = parts.next().unwrap_or(Ok(0)).ok()?;
        Some(Self::new(major, minor, patch))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Package and service name for one package manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageRef {
    pub package: &'static str,
    pub service: &'static str,
}

/// What to do when a dependency is absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallAction {
    /// Operator has to install it; the hint says how.
    Manual { hint: &'static str },
    /// Installable from the OS package source.
    Package {
        apt: PackageRef,
        dnf: PackageRef,
        brew: PackageRef,
    },
}

/// A required system tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: &'static str,
    /// Program looked up on the search path.
    pub program: &'static str,
    /// Arguments printing the version.
    pub version_args: &'static [&'static str],
    pub minimum: Option<Version>,
    pub install: InstallAction,
}

/// Tools the install pipeline needs.
pub fn required() -> Vec<Dependency> {
    vec![
        Dependency {
            name: "Go toolchain",
            program: "go",
            version_args: &["version"],
            minimum: Some(Version::new(1, 21, 0)),
            install: InstallAction::Manual {
                hint: "install Go 1.21+ from https://go.dev/dl/",
            },
        },
        Dependency {
            name: "git",
            program: "git",
            version_args: &["--version"],
            minimum: None,
            install: InstallAction::Manual {
                hint: "install git with your package manager",
            },
        },
        Dependency {
            name: "PostgreSQL",
            program: "psql",
            version_args: &["--version"],
            minimum: None,
            install: InstallAction::Package {
                apt: PackageRef {
                    package: "postgresql",
                    service: "postgresql",
                },
                dnf: PackageRef {
                    package: "postgresql-server",
                    service: "postgresql",
                },
                brew: PackageRef {
                    package: "postgresql@16",
                    service: "postgresql@16",
                },
            },
        },
        Dependency {
            name: "Redis",
            program: "redis-server",
            version_args: &["--version"],
            minimum: None,
            install: InstallAction::Package {
                apt: PackageRef {
                    package: "redis-server",
                    service: "redis-server",
                },
                dnf: PackageRef {
                    package: "redis",
                    service: "redis",
                },
                brew: PackageRef {
                    package: "redis",
                    service: "redis",
                },
            },
        },
    ]
}

/// Outcome of probing one dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    /// Present; version when it could be read.
    Present { version: Option<Version> },
    Absent,
    TooOld { found: Version, required: Version },
}

/// Supported package managers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Apt,
    Dnf,
    Brew,
}

impl PackageManager {
    fn program(&self) -> &'static str {
        match self {
            PackageManager::Apt => "apt-get",
            PackageManager::Dnf => "dnf",
            PackageManager::Brew => "brew",
        }
    }
}

/// Uniform install / enable / start over the host's package manager.
pub struct PackageSource {
    executor: Arc<dyn Executor>,
    manager: PackageManager,
}

impl PackageSource {
    pub fn new(executor: Arc<dyn Executor>, manager: PackageManager) -> Self {
        Self { executor, manager }
    }

    /// Picks the first package manager found on the host.
    pub async fn detect(executor: Arc<dyn Executor>) -> Result<Self> {
        for manager in [PackageManager::Apt, PackageManager::Dnf, PackageManager::Brew] {
            if executor.which(manager.program()).await? {
                debug!(manager = manager.program(), "Detected package manager");
                return Ok(Self::new(executor, manager));
            }
        }
        Err(IssuerError::DependencyMissing {
            name: "package manager".to_string(),
            hint: "none of apt-get, dnf or brew is available".to_string(),
        })
    }

    pub fn manager(&self) -> PackageManager {
        self.manager
    }

    /// Selects this manager's names from an install action.
    pub fn package_for(&self, action: &InstallAction) -> Option<PackageRef> {
        match action {
            InstallAction::Manual { .. } => None,
            InstallAction::Package { apt, dnf, brew } => Some(match self.manager {
                PackageManager::Apt => *apt,
                PackageManager::Dnf => *dnf,
                PackageManager::Brew => *brew,
            }),
        }
    }

    pub async fn install(&self, package: &str) -> Result<()> {
        let spec = match self.manager {
            PackageManager::Apt => CommandSpec::new("apt-get")
                .args(["install", "-y", package])
                .env("DEBIAN_FRONTEND", "noninteractive")
                .privileged(),
            PackageManager::Dnf => CommandSpec::new("dnf")
                .args(["install", "-y", package])
                .privileged(),
            PackageManager::Brew => CommandSpec::new("brew").args(["install", package]),
        };
        self.check(&spec).await
    }

    pub async fn enable_service(&self, service: &str) -> Result<()> {
        match self.manager {
            // brew services start also registers the service at login
            PackageManager::Brew => Ok(()),
            _ => {
                self.check(
                    &CommandSpec::new("systemctl")
                        .args(["enable", service])
                        .privileged(),
                )
                .await
            }
        }
    }

    pub async fn start_service(&self, service: &str) -> Result<()> {
        let spec = match self.manager {
            PackageManager::Brew => CommandSpec::new("brew").args(["services", "start", service]),
            _ => CommandSpec::new("systemctl")
                .args(["start", service])
                .privileged(),
        };
        self.check(&spec).await
    }

    async fn check(&self, spec: &CommandSpec) -> Result<()> {
        info!(command = %spec, "Running package source command");
        let output = self.executor.run(spec).await?;
        if output.success() {
            Ok(())
        } else {
            Err(IssuerError::command(
                &spec.program,
                output.combined().trim().to_string(),
            ))
        }
    }
}

/// Probes dependencies and installs the installable ones.
pub struct DependencyProber {
    executor: Arc<dyn Executor>,
}

impl DependencyProber {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor }
    }

    /// Checks presence and, if a minimum is set, the version.
    pub async fn probe(&self, dep: &Dependency) -> Result<ProbeResult> {
        if !self.executor.which(dep.program).await? {
            return Ok(ProbeResult::Absent);
        }

        let spec = CommandSpec::new(dep.program).args(dep.version_args.iter().copied());
        let output = self.executor.run(&spec).await?;
        let version = Version::extract(&output.combined());

        match (dep.minimum, version) {
            (Some(required), Some(found)) if found < required => {
                Ok(ProbeResult::TooOld { found, required })
            }
            (Some(_), None) => {
                warn!(
                    dependency = dep.name,
                    output = %output.combined().trim(),
                    "Could not read version, assuming it is supported"
                );
                Ok(ProbeResult::Present { version: None })
            }
            _ => Ok(ProbeResult::Present { version }),
        }
    }

    /// Probes every dependency, installing missing installable ones.
    ///
    /// The package source is only detected once something has to be
    /// installed.
    pub async fn ensure_all(
        &self,
        deps: &[Dependency],
    ) -> Result<Vec<(&'static str, Option<Version>)>> {
        let mut source: Option<PackageSource> = None;
        let mut found = Vec::with_capacity(deps.len());

        for dep in deps {
            let version = match self.probe(dep).await? {
                ProbeResult::Present { version } => version,
                ProbeResult::TooOld { found, required } => {
                    return Err(IssuerError::DependencyTooOld {
                        name: dep.name.to_string(),
                        found: found.to_string(),
                        required: required.to_string(),
                    });
                }
                ProbeResult::Absent => {
                    if let InstallAction::Manual { hint } = dep.install {
                        return Err(IssuerError::DependencyMissing {
                            name: dep.name.to_string(),
                            hint: hint.to_string(),
                        });
                    }
                    let pkg_source = match source.take() {
                        Some(pkg_source) => pkg_source,
                        None => PackageSource::detect(self.executor.clone()).await?,
                    };
                    let version = self.install(dep, &pkg_source).await?;
                    source = Some(pkg_source);
                    version
                }
            };

            info!(
                dependency = dep.name,
                version = %version.map(|v| v.to_string()).unwrap_or_else(|| "unknown".into()),
                "Dependency present"
            );
            found.push((dep.name, version));
        }

        Ok(found)
    }

    async fn install(&self, dep: &Dependency, source: &PackageSource) -> Result<Option<Version>> {
        let Some(pkg) = source.package_for(&dep.install) else {
            return Err(IssuerError::DependencyMissing {
                name: dep.name.to_string(),
                hint: "not installable".to_string(),
            });
        };

        info!(dependency = dep.name, package = pkg.package, "Installing dependency");
        source.install(pkg.package).await?;
        source.enable_service(pkg.service).await?;
        source.start_service(pkg.service).await?;

        match self.probe(dep).await? {
            ProbeResult::Present { version } => Ok(version),
            ProbeResult::TooOld { found, required } => Err(IssuerError::DependencyTooOld {
                name: dep.name.to_string(),
                found: found.to_string(),
                required: required.to_string(),
            }),
            ProbeResult::Absent => Err(IssuerError::DependencyMissing {
                name: dep.name.to_string(),
                hint: format!("{} still not found after installing {}", dep.program, pkg.package),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::{CommandOutput, RecordingExecutor};

    fn go() -> Dependency {
        required().into_iter().find(|d| d.program == "go").unwrap()
    }

    fn redis() -> Dependency {
        required()
            .into_iter()
            .find(|d| d.program == "redis-server")
            .unwrap()
    }

    #[test]
    fn test_version_extract() {
        assert_eq!(
            Version::extract("go version go1.22.3 linux/amd64"),
            Some(Version::new(1, 22, 3))
        );
        assert_eq!(
            Version::extract("psql (PostgreSQL) 14.11 (Ubuntu 14.11-0ubuntu0.22.04.1)"),
            Some(Version::new(14, 11, 0))
        );
        assert_eq!(
            Version::extract("Redis server v=7.0.15 sha=00000000:0 malloc=jemalloc-5.3.0"),
            Some(Version::new(7, 0, 15))
        );
        assert_eq!(Version::extract("git version 2.34.1"), Some(Version::new(2, 34, 1)));
        assert_eq!(Version::extract("no digits here"), None);
        assert_eq!(Version::extract("build 42"), None);
    }

    #[test]
    fn test_version_ordering() {
        assert!(Version::new(1, 20, 14) < Version::new(1, 21, 0));
        assert!(Version::new(1, 22, 0) > Version::new(1, 21, 9));
        assert_eq!(Version::new(1, 21, 0).to_string(), "1.21.0");
    }

    #[tokio::test]
    async fn test_probe_present_with_version() {
        let executor = Arc::new(RecordingExecutor::new());
        executor.respond(
            "go version",
            CommandOutput::ok_with_stdout("go version go1.22.3 linux/amd64"),
        );
        let prober = DependencyProber::new(executor);

        let result = prober.probe(&go()).await.unwrap();
        assert_eq!(
            result,
            ProbeResult::Present {
                version: Some(Version::new(1, 22, 3))
            }
        );
    }

    #[tokio::test]
    async fn test_probe_too_old() {
        let executor = Arc::new(RecordingExecutor::new());
        executor.respond(
            "go version",
            CommandOutput::ok_with_stdout("go version go1.19.5 linux/amd64"),
        );
        let prober = DependencyProber::new(executor);

        let err = prober.ensure_all(&[go()]).await.unwrap_err();
        assert!(matches!(err, IssuerError::DependencyTooOld { .. }));
        assert!(err.to_string().contains("1.19.5"));
    }

    #[tokio::test]
    async fn test_missing_manual_dependency_is_fatal() {
        let executor = Arc::new(RecordingExecutor::new());
        executor.missing("go");
        let prober = DependencyProber::new(executor.clone());

        let err = prober.ensure_all(&required()).await.unwrap_err();
        assert!(matches!(err, IssuerError::DependencyMissing { .. }));
        assert!(!executor.commands().iter().any(|c| c.contains("install")));
    }

    #[tokio::test]
    async fn test_missing_installable_dependency_is_installed() {
        let executor = Arc::new(RecordingExecutor::new());
        // absent on the first probe, present on the re-probe
        executor.missing("redis-server");
        let prober = DependencyProber::new(executor.clone());
        let source = PackageSource::new(executor.clone(), PackageManager::Apt);

        assert_eq!(prober.probe(&redis()).await.unwrap(), ProbeResult::Absent);

        executor.respond("command -v redis-server", CommandOutput::ok());
        prober.install(&redis(), &source).await.unwrap();

        let commands = executor.commands();
        assert!(commands.contains(&"apt-get install -y redis-server".to_string()));
        assert!(commands.contains(&"systemctl enable redis-server".to_string()));
        assert!(commands.contains(&"systemctl start redis-server".to_string()));
    }

    #[tokio::test]
    async fn test_install_still_absent_is_fatal() {
        let executor = Arc::new(RecordingExecutor::new());
        executor.missing("redis-server");
        let prober = DependencyProber::new(executor.clone());
        let source = PackageSource::new(executor.clone(), PackageManager::Dnf);

        let err = prober.install(&redis(), &source).await.unwrap_err();
        assert!(err.to_string().contains("still not found"));
        assert!(executor
            .commands()
            .contains(&"dnf install -y redis".to_string()));
    }

    #[tokio::test]
    async fn test_detect_package_manager() {
        let executor = Arc::new(RecordingExecutor::new());
        executor.missing("apt-get");
        let source = PackageSource::detect(executor).await.unwrap();
        assert_eq!(source.manager(), PackageManager::Dnf);
    }

    #[tokio::test]
    async fn test_brew_does_not_escalate() {
        let executor = Arc::new(RecordingExecutor::new());
        let source = PackageSource::new(executor.clone(), PackageManager::Brew);

        source.install("redis").await.unwrap();
        source.enable_service("redis").await.unwrap();
        source.start_service("redis").await.unwrap();

        assert_eq!(
            executor.commands(),
            vec!["brew install redis", "brew services start redis"]
        );
    }
}
