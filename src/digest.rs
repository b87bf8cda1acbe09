use crate::db::Db;
use crate::error::DbResult;
use crate::models::{Column, Project, Task};

/// One column of the board with its tasks in order.
#[derive(Debug, Clone)]
pub struct ColumnDigest {
    pub column: Column,
    pub tasks: Vec<Task>,
}

/// Snapshot of a project grouped the way the board shows it, rendered as
/// the context block handed to the external summarizer/Q&A collaborator.
#[derive(Debug, Clone)]
pub struct ProjectDigest {
    pub project: Project,
    pub columns: Vec<ColumnDigest>,
}

impl Db {
    pub async fn project_digest(&self, project_id: i64) -> DbResult<ProjectDigest> {
        let detail = self.get_project(project_id).await?;

        let mut columns: Vec<ColumnDigest> = detail
            .columns
            .into_iter()
            .map(|column| ColumnDigest {
                column,
                tasks: vec![],
            })
            .collect();

        for task in detail.tasks {
            if let Some(group) = columns.iter_mut().find(|g| g.column.id == task.column_id) {
                group.tasks.push(task);
            }
        }

        Ok(ProjectDigest {
            project: detail.project,
            columns,
        })
    }
}

impl ProjectDigest {
    /// Plain-text rendering: project header, then each column's tasks in
    /// board order.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Project: {}\n", self.project.name));
        out.push_str(&format!("Description: {}\n", self.project.description));

        for group in &self.columns {
            out.push_str(&format!("\n{}:\n", group.column.name));
            for task in &group.tasks {
                out.push_str(&format!("- Task #{}: {}\n", task.id, task.title));
                if !task.description.is_empty() {
                    out.push_str(&format!("  Description: {}\n", task.description));
                }
                out.push_str(&format!(
                    "  Created: {}, Updated: {}\n",
                    task.created_at, task.updated_at
                ));
            }
        }

        out
    }
}
