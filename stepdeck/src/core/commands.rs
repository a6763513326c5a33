//! Argv construction for framework console and package-manager actions.

use crate::io::config::{ConsoleConfig, PackagesConfig};
use crate::model::action::{ConsolePreference, PackageManager};

const NO_INTERACTION_FLAGS: [&str; 2] = ["-n", "--no-interaction"];

/// Build the argv for a console command.
///
/// `local_entry_present` reports whether the project-local entry point exists;
/// with `ConsolePreference::Auto` it selects between the interpreter prefix and
/// the external launcher.
pub fn console_argv(
    console: &ConsoleConfig,
    local_entry_present: bool,
    prefer: ConsolePreference,
    command: &str,
    args: &[String],
) -> Vec<String> {
    let use_local = match prefer {
        ConsolePreference::Auto => local_entry_present,
        ConsolePreference::Local => true,
        ConsolePreference::Launcher => false,
    };

    let mut argv = if use_local {
        let mut prefix = console.interpreter.clone();
        prefix.push(console.entry_point.clone());
        prefix
    } else {
        console.launcher.clone()
    };
    argv.push(command.to_string());
    argv.extend(args.iter().cloned());

    let has_flag = args
        .iter()
        .any(|arg| NO_INTERACTION_FLAGS.contains(&arg.as_str()));
    if console.auto_no_interaction && !has_flag {
        argv.push("-n".to_string());
    }
    argv
}

/// Build the argv for installing `packages` with the chosen manager.
pub fn package_argv(
    packages_cfg: &PackagesConfig,
    console: &ConsoleConfig,
    local_entry_present: bool,
    manager: PackageManager,
    packages: &[String],
    dev: bool,
) -> Vec<String> {
    match manager {
        PackageManager::Composer => {
            let mut argv = packages_cfg.composer.clone();
            argv.push("require".to_string());
            if dev {
                argv.push("--dev".to_string());
            }
            argv.extend(packages.iter().cloned());
            argv
        }
        PackageManager::Importmap => console_argv(
            console,
            local_entry_present,
            ConsolePreference::Auto,
            &packages_cfg.importmap_command,
            packages,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn auto_prefers_local_entry_point_when_present() {
        let console = ConsoleConfig::default();
        let argv = console_argv(&console, true, ConsolePreference::Auto, "cache:clear", &[]);
        assert_eq!(argv, strings(&["php", "bin/console", "cache:clear", "-n"]));
    }

    #[test]
    fn auto_falls_back_to_launcher() {
        let console = ConsoleConfig::default();
        let args = strings(&["App\\Entity\\Product"]);
        let argv = console_argv(&console, false, ConsolePreference::Auto, "make:entity", &args);
        assert_eq!(
            argv,
            strings(&["symfony", "console", "make:entity", "App\\Entity\\Product", "-n"])
        );
    }

    #[test]
    fn explicit_preference_overrides_probe() {
        let console = ConsoleConfig::default();
        let argv = console_argv(&console, true, ConsolePreference::Launcher, "about", &[]);
        assert_eq!(argv[0], "symfony");
        let argv = console_argv(&console, false, ConsolePreference::Local, "about", &[]);
        assert_eq!(argv[0], "php");
    }

    #[test]
    fn existing_no_interaction_flag_is_not_duplicated() {
        let console = ConsoleConfig::default();
        let args = strings(&["--no-interaction"]);
        let argv = console_argv(&console, true, ConsolePreference::Auto, "about", &args);
        assert_eq!(argv.iter().filter(|a| a.starts_with("-")).count(), 1);
    }

    #[test]
    fn no_interaction_can_be_disabled() {
        let console = ConsoleConfig {
            auto_no_interaction: false,
            ..ConsoleConfig::default()
        };
        let argv = console_argv(&console, true, ConsolePreference::Auto, "about", &[]);
        assert_eq!(argv, strings(&["php", "bin/console", "about"]));
    }

    #[test]
    fn composer_require_places_dev_flag_before_packages() {
        let argv = package_argv(
            &PackagesConfig::default(),
            &ConsoleConfig::default(),
            true,
            PackageManager::Composer,
            &strings(&["phpunit/phpunit"]),
            true,
        );
        assert_eq!(argv, strings(&["composer", "require", "--dev", "phpunit/phpunit"]));
    }

    #[test]
    fn importmap_goes_through_console() {
        let argv = package_argv(
            &PackagesConfig::default(),
            &ConsoleConfig::default(),
            true,
            PackageManager::Importmap,
            &strings(&["bootstrap"]),
            false,
        );
        assert_eq!(
            argv,
            strings(&["php", "bin/console", "importmap:require", "bootstrap", "-n"])
        );
    }
}
