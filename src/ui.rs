//! Terminal output for the `c3pm` binary.
//!
//! ```text
//! Dependencies for demo:
//! ├─── foo (git-c3pm: https://example.com/foo.git, master)
//! └─── bar (git-c3pm: git@example.com:bar.git, master)
//! ```

use crate::deps::{DependencyUpdate, SyncKind, UpdateReport, UpdateState};
use crate::manifest::{DependencySpec, Project};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};

pub const ISSUES_LINK: &str = "https://github.com/c3pm/c3pm/issues";

pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn warning(msg: &str) {
    eprintln!("{} {}", "!".yellow(), msg);
}

pub fn error(msg: &str) {
    eprintln!("{} {}", "x".red(), msg);
}

pub fn describe_colored(name: &str, spec: &DependencySpec) -> String {
    format!(
        "{} ({}: {}, {})",
        name.bold(),
        spec.kind.as_str().cyan(),
        spec.source.dimmed(),
        spec.reference.green()
    )
}

pub fn dependency_lines(project: &Project) -> Vec<String> {
    let dependencies = project.list();
    if dependencies.is_empty() {
        return vec![format!(
            "Project {} doesn't have any dependencies",
            project.name
        )
        .bold()
        .cyan()
        .to_string()];
    }

    let mut lines = vec![
        format!("Dependencies for {}:", project.name)
            .bold()
            .cyan()
            .to_string(),
    ];
    let count = dependencies.len();
    for (i, (name, spec)) in dependencies.into_iter().enumerate() {
        let prefix = if i + 1 == count { "└─── " } else { "├─── " };
        lines.push(format!("{}{}", prefix.bold().cyan(), describe_colored(name, spec)));
    }
    lines
}

pub fn print_dependencies(project: &Project) {
    for line in dependency_lines(project) {
        println!("{}", line);
    }
}

pub fn update_line(result: &DependencyUpdate) -> String {
    match &result.outcome {
        Ok(updated) => {
            let how = match updated.sync {
                SyncKind::Cloned => "cloned",
                SyncKind::Fetched => "fetched",
            };
            format!(
                "   {} {} {} @ {} ({} files imported)",
                "✓".green(),
                result.name.bold(),
                how,
                short_hash(&updated.revision).dimmed(),
                updated.files
            )
        }
        Err(err) => {
            let stage = match result.failed_at() {
                Some(UpdateState::Fetching) => "fetch",
                Some(UpdateState::CheckedOut) => "import",
                _ => "update",
            };
            format!(
                "   {} {} {} failed: {}",
                "x".red(),
                result.name.bold(),
                stage,
                err
            )
        }
    }
}

fn short_hash(rev: &str) -> &str {
    rev.get(..7).unwrap_or(rev)
}

pub fn print_update_report(report: &UpdateReport) {
    for result in &report.results {
        println!("{}", update_line(result));
    }
}

pub fn update_progress(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.blue} [{elapsed_precise}] [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.set_message("Updating dependencies...");
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_listing() {
        let project = Project::new("demo").unwrap();
        let lines = dependency_lines(&project);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("doesn't have any dependencies"));
    }

    #[test]
    fn test_listing_tree() {
        let mut project = Project::new("demo").unwrap();
        project.add("foo", "https://example.com/foo.git", "master").unwrap();
        project.add("bar", "https://example.com/bar.git", "master").unwrap();

        let lines = dependency_lines(&project);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("Dependencies for demo:"));
        assert!(lines[1].contains("├───") && lines[1].contains("foo"));
        assert!(lines[2].contains("└───") && lines[2].contains("bar"));
        assert!(lines[2].contains("https://example.com/bar.git"));
    }

    #[test]
    fn test_short_hash() {
        assert_eq!(short_hash("0123456789abcdef"), "0123456");
        assert_eq!(short_hash("abc"), "abc");
    }
}
