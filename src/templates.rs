use askama::Template;

use crate::entities::{GroupedTodos, Status, Todo};

#[derive(Template, Default)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub username: String,
    pub error: Option<&'static str>,
}

#[derive(Template, Default)]
#[template(path = "register.html")]
pub struct RegisterTemplate {
    pub username: String,
    pub error: Option<&'static str>,
    pub success: Option<&'static str>,
}

pub struct Section {
    pub status: Status,
    pub todos: Vec<Todo>,
}

impl Section {
    pub fn is_current(&self, option: &Status) -> bool {
        self.status == *option
    }
}

/// The grouped listing plus the new-task form, which keeps the submitted
/// values when it is re-shown with an error.
#[derive(Template)]
#[template(path = "todos.html")]
pub struct TodosTemplate {
    pub username: String,
    pub sections: Vec<Section>,
    pub statuses: [Status; 3],
    pub error: Option<&'static str>,
    pub task: String,
    pub due_date: String,
    pub status: String,
}

impl TodosTemplate {
    pub fn new(username: String, grouped: GroupedTodos) -> Self {
        let GroupedTodos {
            planned,
            ongoing,
            completed,
            ..
        } = grouped;

        Self {
            username,
            sections: vec![
                Section { status: Status::Planned, todos: planned },
                Section { status: Status::Ongoing, todos: ongoing },
                Section { status: Status::Completed, todos: completed },
            ],
            statuses: Status::ALL,
            error: None,
            task: String::new(),
            due_date: String::new(),
            status: Status::default().to_string(),
        }
    }

    pub fn is_selected(&self, option: &Status) -> bool {
        option.as_str() == self.status
    }
}
