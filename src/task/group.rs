// ABOUTME: Lightweight task group tree used for the session's main-task path
// ABOUTME: Groups only affect how paths appear in state logs

/// A named grouping node. Groups nest, and leaf entries are task names.
#[derive(Debug, Clone, Default)]
pub struct Group {
    name: String,
    description: Option<String>,
    subgroups: Vec<Group>,
    task_names: Vec<String>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn add_group(mut self, group: Group) -> Self {
        self.subgroups.push(group);
        self
    }

    pub fn add_task_name(mut self, task_name: impl Into<String>) -> Self {
        self.task_names.push(task_name.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        self.description.as_deref().unwrap_or(&self.name)
    }

    /// The group path down to a task, including the task name itself.
    /// Returns `None` when the task is not in this tree.
    pub fn find_task_path(&self, task_name: &str) -> Option<Vec<String>> {
        if self.task_names.iter().any(|name| name == task_name) {
            return Some(vec![self.name.clone(), task_name.to_string()]);
        }
        for subgroup in &self.subgroups {
            if let Some(mut path) = subgroup.find_task_path(task_name) {
                path.insert(0, self.name.clone());
                return Some(path);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_task_path() {
        let root = Group::new("root")
            .add_task_name("top")
            .add_group(Group::new("deploy").add_task_name("push"));

        assert_eq!(
            root.find_task_path("top"),
            Some(vec!["root".to_string(), "top".to_string()])
        );
        assert_eq!(
            root.find_task_path("push"),
            Some(vec![
                "root".to_string(),
                "deploy".to_string(),
                "push".to_string()
            ])
        );
        assert_eq!(root.find_task_path("missing"), None);
    }
}
