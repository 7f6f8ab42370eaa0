use std::time::Duration;

use stowage_platform::{CommandSpec, OsFamily, OsInfo};

const TAILSCALE_PKGS: &str = "https://pkgs.tailscale.com/stable";
const TAILSCALE_KEYRING: &str = "/usr/share/keyrings/tailscale-archive-keyring.gpg";
const TAILSCALE_APT_LIST: &str = "/etc/apt/sources.list.d/tailscale.list";
const DNF5_SINCE: u32 = 41;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepTimeouts {
    /// Key downloads, repository registration, service enablement.
    pub quick: Duration,
    /// Package index refresh and package installation.
    pub package: Duration,
}

impl Default for StepTimeouts {
    fn default() -> Self {
        Self {
            quick: Duration::from_secs(30),
            package: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallStep {
    Run {
        description: String,
        command: CommandSpec,
    },
    /// Download `url` and place it at `destination` with root ownership.
    Fetch {
        description: String,
        url: String,
        destination: String,
    },
}

impl InstallStep {
    fn run(description: impl Into<String>, command: CommandSpec) -> Self {
        Self::Run {
            description: description.into(),
            command,
        }
    }

    #[must_use]
    pub fn description(&self) -> &str {
        match self {
            Self::Run { description, .. } | Self::Fetch { description, .. } => description,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPlan {
    pub tool: String,
    pub steps: Vec<InstallStep>,
}

/// The ordered steps that install `tool` on `os`, or `None` when no strategy
/// exists for that combination.
#[must_use]
pub fn plan_for(tool: &str, os: &OsInfo, timeouts: &StepTimeouts) -> Option<InstallPlan> {
    let steps = match (tool, os.family) {
        (_, OsFamily::Unsupported) => return None,
        ("tailscale", OsFamily::Debian) => tailscale_debian(os, timeouts)?,
        ("tailscale", OsFamily::Arch) => vec![
            pacman_install("tailscale", timeouts),
            enable_service("tailscaled", timeouts),
        ],
        ("tailscale", OsFamily::Fedora) => vec![
            dnf_add_repo(
                os,
                &format!("{TAILSCALE_PKGS}/fedora/tailscale.repo"),
                timeouts,
            ),
            dnf_install("tailscale", timeouts),
            enable_service("tailscaled", timeouts),
        ],
        ("rclone", family) => distribution_package("rclone", family, timeouts),
        ("ssh", OsFamily::Debian) => distribution_package("openssh-client", OsFamily::Debian, timeouts),
        ("ssh", OsFamily::Arch) => distribution_package("openssh", OsFamily::Arch, timeouts),
        ("ssh", OsFamily::Fedora) => distribution_package("openssh-clients", OsFamily::Fedora, timeouts),
        _ => return None,
    };

    Some(InstallPlan {
        tool: tool.to_string(),
        steps,
    })
}

/// Where to point the operator when no automatic strategy applies.
#[must_use]
pub fn manual_instructions(tool: &str) -> String {
    match tool {
        "tailscale" => "Install Tailscale manually: https://tailscale.com/download/linux".to_string(),
        "rclone" => "Install rclone manually: https://rclone.org/install/".to_string(),
        "ssh" => "Install your distribution's OpenSSH client package".to_string(),
        other => format!("Install `{other}` with your distribution's package manager"),
    }
}

fn tailscale_debian(os: &OsInfo, timeouts: &StepTimeouts) -> Option<Vec<InstallStep>> {
    let distro = std::iter::once(os.id.as_str())
        .chain(os.id_like.iter().map(String::as_str))
        .find(|id| matches!(*id, "ubuntu" | "debian" | "raspbian"))?;
    let codename = os.version_codename.as_deref()?;
    let base = format!("{TAILSCALE_PKGS}/{distro}/{codename}");

    let mut steps = vec![
        InstallStep::Fetch {
            description: "Fetch Tailscale signing key".to_string(),
            url: format!("{base}.noarmor.gpg"),
            destination: TAILSCALE_KEYRING.to_string(),
        },
        InstallStep::Fetch {
            description: "Register Tailscale repository".to_string(),
            url: format!("{base}.tailscale-keyring.list"),
            destination: TAILSCALE_APT_LIST.to_string(),
        },
    ];
    steps.extend(distribution_package("tailscale", OsFamily::Debian, timeouts));
    Some(steps)
}

fn distribution_package(package: &str, family: OsFamily, timeouts: &StepTimeouts) -> Vec<InstallStep> {
    match family {
        OsFamily::Debian => vec![
            InstallStep::run(
                "Update package index",
                apt(timeouts).arg("update"),
            ),
            InstallStep::run(
                format!("Install {package}"),
                apt(timeouts).args(["install", "-y", package]),
            ),
        ],
        OsFamily::Arch => vec![pacman_install(package, timeouts)],
        OsFamily::Fedora => vec![dnf_install(package, timeouts)],
        OsFamily::Unsupported => Vec::new(),
    }
}

fn apt(timeouts: &StepTimeouts) -> CommandSpec {
    CommandSpec::new("apt-get", timeouts.package)
        .env("DEBIAN_FRONTEND", "noninteractive")
        .privileged()
}

fn pacman_install(package: &str, timeouts: &StepTimeouts) -> InstallStep {
    InstallStep::run(
        format!("Install {package}"),
        CommandSpec::new("pacman", timeouts.package)
            .args(["-Sy", "--noconfirm", "--needed", package])
            .privileged(),
    )
}

/// dnf5 (Fedora 41 and later) replaced `config-manager --add-repo` with the
/// `addrepo` subcommand.
fn dnf_add_repo(os: &OsInfo, repo_file: &str, timeouts: &StepTimeouts) -> InstallStep {
    let dnf5 = os.major_version().is_some_and(|major| major >= DNF5_SINCE);
    let command = CommandSpec::new("dnf", timeouts.quick).arg("config-manager");
    let command = if dnf5 {
        command.args(["addrepo", &format!("--from-repofile={repo_file}")])
    } else {
        command.args(["--add-repo", repo_file])
    };
    InstallStep::run("Register Tailscale repository", command.privileged())
}

fn dnf_install(package: &str, timeouts: &StepTimeouts) -> InstallStep {
    InstallStep::run(
        format!("Install {package}"),
        CommandSpec::new("dnf", timeouts.package)
            .args(["install", "-y", package])
            .privileged(),
    )
}

fn enable_service(unit: &str, timeouts: &StepTimeouts) -> InstallStep {
    InstallStep::run(
        format!("Enable {unit}"),
        CommandSpec::new("systemctl", timeouts.quick)
            .args(["enable", "--now", unit])
            .privileged(),
    )
}

#[cfg(test)]
mod tests {
    use stowage_platform::OsInfo;

    use super::{InstallStep, StepTimeouts, plan_for};

    fn descriptions(tool: &str, os_release: &str) -> Option<Vec<String>> {
        plan_for(tool, &OsInfo::parse(os_release), &StepTimeouts::default()).map(|plan| {
            plan.steps
                .iter()
                .map(|step| step.description().to_string())
                .collect()
        })
    }

    #[test]
    fn tailscale_on_debian_registers_repository_before_installing() {
        let steps = descriptions("tailscale", "ID=debian\nVERSION_CODENAME=bookworm\n")
            .expect("debian has a tailscale strategy");

        assert_eq!(
            steps,
            vec![
                "Fetch Tailscale signing key",
                "Register Tailscale repository",
                "Update package index",
                "Install tailscale",
            ]
        );
    }

    #[test]
    fn tailscale_debian_urls_use_distro_and_codename() {
        let os = OsInfo::parse("ID=pop\nID_LIKE=\"ubuntu debian\"\nVERSION_CODENAME=jammy\n");
        let plan = plan_for("tailscale", &os, &StepTimeouts::default()).expect("plan exists");

        let InstallStep::Fetch {
            url, destination, ..
        } = &plan.steps[0]
        else {
            panic!("first step should fetch the signing key");
        };
        assert_eq!(url, "https://pkgs.tailscale.com/stable/ubuntu/jammy.noarmor.gpg");
        assert_eq!(destination, "/usr/share/keyrings/tailscale-archive-keyring.gpg");
    }

    #[test]
    fn tailscale_on_debian_without_codename_has_no_strategy() {
        assert!(descriptions("tailscale", "ID=debian\n").is_none());
    }

    #[test]
    fn arch_and_fedora_enable_tailscaled() {
        let arch = descriptions("tailscale", "ID=arch\n").expect("arch plan");
        assert_eq!(arch.last().map(String::as_str), Some("Enable tailscaled"));

        let fedora = descriptions("tailscale", "ID=fedora\n").expect("fedora plan");
        assert_eq!(fedora.first().map(String::as_str), Some("Register Tailscale repository"));
        assert_eq!(fedora.len(), 3);
    }

    fn repo_command(os_release: &str) -> String {
        let plan = plan_for("tailscale", &OsInfo::parse(os_release), &StepTimeouts::default())
            .expect("fedora plan");
        let InstallStep::Run { command, .. } = &plan.steps[0] else {
            panic!("fedora registers the repository with dnf");
        };
        format!("{} {}", command.program, command.args.join(" "))
    }

    #[test]
    fn fedora_repository_syntax_follows_dnf_generation() {
        assert_eq!(
            repo_command("ID=fedora\nVERSION_ID=40\n"),
            "dnf config-manager --add-repo https://pkgs.tailscale.com/stable/fedora/tailscale.repo"
        );
        assert_eq!(
            repo_command("ID=fedora\nVERSION_ID=41\n"),
            "dnf config-manager addrepo --from-repofile=https://pkgs.tailscale.com/stable/fedora/tailscale.repo"
        );
        assert_eq!(
            repo_command("ID=nobara\nID_LIKE=\"rhel fedora\"\nVERSION_ID=42\n"),
            "dnf config-manager addrepo --from-repofile=https://pkgs.tailscale.com/stable/fedora/tailscale.repo"
        );
    }

    #[test]
    fn ssh_maps_to_family_specific_package() {
        assert_eq!(
            descriptions("ssh", "ID=ubuntu\n").expect("plan"),
            vec!["Update package index", "Install openssh-client"]
        );
        assert_eq!(
            descriptions("ssh", "ID=arch\n").expect("plan"),
            vec!["Install openssh"]
        );
        assert_eq!(
            descriptions("ssh", "ID=fedora\n").expect("plan"),
            vec!["Install openssh-clients"]
        );
    }

    #[test]
    fn package_steps_are_privileged_and_bounded() {
        let plan = plan_for("rclone", &OsInfo::parse("ID=debian\n"), &StepTimeouts::default())
            .expect("plan exists");

        for step in &plan.steps {
            let InstallStep::Run { command, .. } = step else {
                panic!("rclone on debian only runs commands");
            };
            assert!(command.privileged);
            assert_eq!(command.timeout.as_secs(), 60);
        }
    }

    #[test]
    fn unsupported_family_or_unknown_tool_has_no_strategy() {
        assert!(descriptions("tailscale", "ID=alpine\n").is_none());
        assert!(descriptions("kopia", "ID=debian\n").is_none());
    }
}
