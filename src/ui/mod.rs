pub mod icons;
pub mod progress;

pub use progress::RunUI;

use console::{Emoji, style};

use crate::step::{Step, StepStatus};
use crate::tree::{self, FileTreeNode};
use icons::{CHECK, CROSS, FILE, FOLDER, PENDING, RUNNING, SKIPPED};

pub fn status_icon(status: StepStatus) -> Emoji<'static, 'static> {
    match status {
        StepStatus::Pending => PENDING,
        StepStatus::InProgress => RUNNING,
        StepStatus::Completed => CHECK,
        StepStatus::Error => CROSS,
    }
}

/// One line per step: icon, id, kind and title. `skipped` names the lifecycle
/// pattern that kept a completed command out of the queue.
pub fn format_step(step: &Step, skipped: Option<&str>) -> String {
    let icon = match skipped {
        Some(_) => SKIPPED,
        None => status_icon(step.status),
    };
    let kind = style(format!("{:<14}", step.kind().as_str())).dim();
    let mut line = format!("{}{:>3} {} {}", icon, step.id, kind, step.title);
    if let Some(pattern) = skipped {
        line.push_str(&format!(" {}", style(format!("(skipped: {})", pattern)).dim()));
    }
    line
}

/// The tree in display order with icons, one entry per line.
pub fn format_tree(nodes: &[FileTreeNode]) -> Vec<String> {
    let mut lines = Vec::new();
    push_tree_lines(&tree::sorted(nodes), 0, &mut lines);
    lines
}

fn push_tree_lines(nodes: &[FileTreeNode], depth: usize, lines: &mut Vec<String>) {
    let indent = "  ".repeat(depth);
    for node in nodes {
        if node.is_folder() {
            lines.push(format!("{}{}{}", indent, FOLDER, style(format!("{}/", node.name)).cyan()));
            push_tree_lines(node.children(), depth + 1, lines);
        } else {
            lines.push(format!("{}{}{}", indent, FILE, node.name));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::StepAction;

    #[test]
    fn test_format_step_includes_id_and_title() {
        console::set_colors_enabled(false);
        let step = Step::new(
            3,
            StepAction::CreateFile {
                path: "src/main.rs".into(),
                content: String::new(),
            },
        );
        let line = format_step(&step, None);
        assert!(line.contains("  3"));
        assert!(line.contains("create_file"));
        assert!(line.contains(&step.title));
    }

    #[test]
    fn test_format_step_marks_skipped() {
        console::set_colors_enabled(false);
        let step = Step::new(
            1,
            StepAction::RunCommand {
                command: "npm install".into(),
            },
        );
        assert!(format_step(&step, Some("npm install")).contains("(skipped: npm install)"));
    }

    #[test]
    fn test_format_tree_folders_first() {
        console::set_colors_enabled(false);
        let mut nodes = Vec::new();
        tree::upsert_file(&mut nodes, "z.txt", "").unwrap();
        tree::upsert_file(&mut nodes, "src/a.rs", "").unwrap();
        let lines = format_tree(&nodes);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("src/"));
        assert!(lines[1].starts_with("  ") && lines[1].ends_with("a.rs"));
        assert!(lines[2].ends_with("z.txt"));
    }
}
