//! The tool surface: one declarative definition per remote operation plus
//! the handler that maps validated arguments onto transport calls. The
//! definition table and the dispatch match are keyed by the same names; a
//! test guards that they stay in sync.

use std::path::{Path, PathBuf};

use reqwest::Method;
use serde_json::{Map, Value, json};

use dooray_core::envelope::Page;
use dooray_core::error::DoorayError;

use crate::client::DoorayClient;
use crate::util::filename_from_content_disposition;

#[derive(Debug)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

pub fn find_tool(name: &str) -> Option<ToolDefinition> {
    tool_definitions().into_iter().find(|tool| tool.name == name)
}

pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "get-my-member-info",
            description: "Fetch the member profile bound to the configured API token.",
            input_schema: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "get-project-list",
            description: "List projects visible to the authenticated member.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "page": { "type": "integer", "minimum": 0 },
                    "size": { "type": "integer", "minimum": 1, "maximum": 100 }
                },
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "get-project",
            description: "Fetch a single project by id.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "projectId": { "type": "string" }
                },
                "required": ["projectId"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "create-project",
            description: "Create a project with a unique code.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "code": { "type": "string" },
                    "description": { "type": "string" },
                    "scope": { "type": "string", "enum": ["private", "public"] }
                },
                "required": ["code"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "get-task-list",
            description: "List tasks (posts) in a project, optionally filtered by workflow class.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "projectId": { "type": "string" },
                    "workflowClass": { "type": "string", "enum": ["registered", "working", "closed"] },
                    "page": { "type": "integer", "minimum": 0 },
                    "size": { "type": "integer", "minimum": 1, "maximum": 100 }
                },
                "required": ["projectId"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "get-task",
            description: "Fetch a single task by id.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "projectId": { "type": "string" },
                    "taskId": { "type": "string" }
                },
                "required": ["projectId", "taskId"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "create-task",
            description: "Create a task in a project. Body text is markdown.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "projectId": { "type": "string" },
                    "subject": { "type": "string" },
                    "body": { "type": "string" },
                    "dueDate": { "type": "string" },
                    "priority": { "type": "string", "enum": ["highest", "high", "normal", "low", "lowest", "none"] },
                    "parentTaskId": { "type": "string" },
                    "toMemberIds": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["projectId", "subject"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "update-task",
            description: "Update fields of an existing task. At least one field is required.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "projectId": { "type": "string" },
                    "taskId": { "type": "string" },
                    "subject": { "type": "string" },
                    "body": { "type": "string" },
                    "dueDate": { "type": "string" },
                    "priority": { "type": "string", "enum": ["highest", "high", "normal", "low", "lowest", "none"] }
                },
                "required": ["projectId", "taskId"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "set-task-workflow",
            description: "Move a task to another workflow state.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "projectId": { "type": "string" },
                    "taskId": { "type": "string" },
                    "workflowId": { "type": "string" }
                },
                "required": ["projectId", "taskId", "workflowId"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "get-task-comment-list",
            description: "List comments on a task.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "projectId": { "type": "string" },
                    "taskId": { "type": "string" },
                    "page": { "type": "integer", "minimum": 0 },
                    "size": { "type": "integer", "minimum": 1, "maximum": 100 }
                },
                "required": ["projectId", "taskId"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "create-task-comment",
            description: "Add a markdown comment to a task.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "projectId": { "type": "string" },
                    "taskId": { "type": "string" },
                    "content": { "type": "string" }
                },
                "required": ["projectId", "taskId", "content"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "delete-task-comment",
            description: "Delete a comment from a task.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "projectId": { "type": "string" },
                    "taskId": { "type": "string" },
                    "commentId": { "type": "string" }
                },
                "required": ["projectId", "taskId", "commentId"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "get-tag-list",
            description: "List tags defined in a project.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "projectId": { "type": "string" },
                    "page": { "type": "integer", "minimum": 0 },
                    "size": { "type": "integer", "minimum": 1, "maximum": 100 }
                },
                "required": ["projectId"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "create-tag",
            description: "Create a tag in a project.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "projectId": { "type": "string" },
                    "name": { "type": "string" },
                    "color": { "type": "string" }
                },
                "required": ["projectId", "name"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "get-template-list",
            description: "List task templates in a project.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "projectId": { "type": "string" },
                    "page": { "type": "integer", "minimum": 0 },
                    "size": { "type": "integer", "minimum": 1, "maximum": 100 }
                },
                "required": ["projectId"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "get-template",
            description: "Fetch a single task template by id.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "projectId": { "type": "string" },
                    "templateId": { "type": "string" }
                },
                "required": ["projectId", "templateId"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "get-wiki-list",
            description: "List wikis visible to the authenticated member.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "page": { "type": "integer", "minimum": 0 },
                    "size": { "type": "integer", "minimum": 1, "maximum": 100 }
                },
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "get-wiki-page-list",
            description: "List pages of a wiki, optionally below a parent page.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "wikiId": { "type": "string" },
                    "parentPageId": { "type": "string" },
                    "page": { "type": "integer", "minimum": 0 },
                    "size": { "type": "integer", "minimum": 1, "maximum": 100 }
                },
                "required": ["wikiId"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "get-wiki-page",
            description: "Fetch a single wiki page with its content.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "wikiId": { "type": "string" },
                    "pageId": { "type": "string" }
                },
                "required": ["wikiId", "pageId"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "create-wiki-page",
            description: "Create a wiki page. Content is markdown.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "wikiId": { "type": "string" },
                    "subject": { "type": "string" },
                    "content": { "type": "string" },
                    "parentPageId": { "type": "string" }
                },
                "required": ["wikiId", "subject", "content"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "update-wiki-page",
            description: "Update the subject and/or content of a wiki page.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "wikiId": { "type": "string" },
                    "pageId": { "type": "string" },
                    "subject": { "type": "string" },
                    "content": { "type": "string" }
                },
                "required": ["wikiId", "pageId"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "get-drive-list",
            description: "List drives visible to the authenticated member.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "page": { "type": "integer", "minimum": 0 },
                    "size": { "type": "integer", "minimum": 1, "maximum": 100 }
                },
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "get-drive-file-list",
            description: "List files in a drive.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "driveId": { "type": "string" },
                    "page": { "type": "integer", "minimum": 0 },
                    "size": { "type": "integer", "minimum": 1, "maximum": 100 }
                },
                "required": ["driveId"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "get-drive-file-metadata",
            description: "Fetch file metadata without downloading the content.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "driveId": { "type": "string" },
                    "fileId": { "type": "string" }
                },
                "required": ["driveId", "fileId"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "download-drive-file",
            description: "Download a drive file to a local path. If the path is a directory, the remote filename is used.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "driveId": { "type": "string" },
                    "fileId": { "type": "string" },
                    "destinationPath": { "type": "string" }
                },
                "required": ["driveId", "fileId", "destinationPath"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "upload-drive-file",
            description: "Upload a local file into a drive.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "driveId": { "type": "string" },
                    "sourcePath": { "type": "string" },
                    "fileName": { "type": "string" }
                },
                "required": ["driveId", "sourcePath"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "api-request",
            description: "Escape hatch: call any Dooray API path with an arbitrary verb.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "method": { "type": "string", "enum": ["GET", "POST", "PUT", "PATCH", "DELETE"] },
                    "path": { "type": "string" },
                    "query": { "type": "object" },
                    "body": { "type": "object" }
                },
                "required": ["method", "path"],
                "additionalProperties": false
            }),
        },
    ]
}

pub async fn execute_tool(
    client: &DoorayClient,
    name: &str,
    args: &Map<String, Value>,
) -> Result<String, DoorayError> {
    match name {
        "get-my-member-info" => get_my_member_info(client, args).await,
        "get-project-list" => get_project_list(client, args).await,
        "get-project" => get_project(client, args).await,
        "create-project" => create_project(client, args).await,
        "get-task-list" => get_task_list(client, args).await,
        "get-task" => get_task(client, args).await,
        "create-task" => create_task(client, args).await,
        "update-task" => update_task(client, args).await,
        "set-task-workflow" => set_task_workflow(client, args).await,
        "get-task-comment-list" => get_task_comment_list(client, args).await,
        "create-task-comment" => create_task_comment(client, args).await,
        "delete-task-comment" => delete_task_comment(client, args).await,
        "get-tag-list" => get_tag_list(client, args).await,
        "create-tag" => create_tag(client, args).await,
        "get-template-list" => get_template_list(client, args).await,
        "get-template" => get_template(client, args).await,
        "get-wiki-list" => get_wiki_list(client, args).await,
        "get-wiki-page-list" => get_wiki_page_list(client, args).await,
        "get-wiki-page" => get_wiki_page(client, args).await,
        "create-wiki-page" => create_wiki_page(client, args).await,
        "update-wiki-page" => update_wiki_page(client, args).await,
        "get-drive-list" => get_drive_list(client, args).await,
        "get-drive-file-list" => get_drive_file_list(client, args).await,
        "get-drive-file-metadata" => get_drive_file_metadata(client, args).await,
        "download-drive-file" => download_drive_file(client, args).await,
        "upload-drive-file" => upload_drive_file(client, args).await,
        "api-request" => api_request(client, args).await,
        _ => Err(DoorayError::transport(format!(
            "no handler registered for tool '{name}'"
        ))),
    }
}

async fn get_my_member_info(
    client: &DoorayClient,
    _args: &Map<String, Value>,
) -> Result<String, DoorayError> {
    let payload = client.get("/common/v1/members/me", &[]).await?;
    format_payload(&payload)
}

async fn get_project_list(
    client: &DoorayClient,
    args: &Map<String, Value>,
) -> Result<String, DoorayError> {
    let query = page_query(args)?;
    let page = client.get_paginated("/project/v1/projects", &query).await?;
    format_page(&page)
}

async fn get_project(
    client: &DoorayClient,
    args: &Map<String, Value>,
) -> Result<String, DoorayError> {
    let project_id = required_string(args, "projectId")?;
    let payload = client
        .get(&format!("/project/v1/projects/{project_id}"), &[])
        .await?;
    format_payload(&payload)
}

async fn create_project(
    client: &DoorayClient,
    args: &Map<String, Value>,
) -> Result<String, DoorayError> {
    let code = required_string(args, "code")?;
    let mut body = json!({ "code": code });
    if let Some(description) = arg_optional_string(args, "description")? {
        body["description"] = json!(description);
    }
    if let Some(scope) = arg_optional_string(args, "scope")? {
        body["scope"] = json!(scope);
    }
    let payload = client.post("/project/v1/projects", &body).await?;
    format_payload(&payload)
}

async fn get_task_list(
    client: &DoorayClient,
    args: &Map<String, Value>,
) -> Result<String, DoorayError> {
    let project_id = required_string(args, "projectId")?;
    let mut query = page_query(args)?;
    if let Some(workflow_class) = arg_optional_string(args, "workflowClass")? {
        query.push(("workflowClass".to_string(), workflow_class));
    }
    let page = client
        .get_paginated(&format!("/project/v1/projects/{project_id}/posts"), &query)
        .await?;
    format_page(&page)
}

async fn get_task(
    client: &DoorayClient,
    args: &Map<String, Value>,
) -> Result<String, DoorayError> {
    let project_id = required_string(args, "projectId")?;
    let task_id = required_string(args, "taskId")?;
    let payload = client
        .get(
            &format!("/project/v1/projects/{project_id}/posts/{task_id}"),
            &[],
        )
        .await?;
    format_payload(&payload)
}

async fn create_task(
    client: &DoorayClient,
    args: &Map<String, Value>,
) -> Result<String, DoorayError> {
    let project_id = required_string(args, "projectId")?;
    let subject = required_string(args, "subject")?;

    let mut body = json!({ "subject": subject });
    if let Some(content) = arg_optional_string(args, "body")? {
        body["body"] = markdown_body(&content);
    }
    if let Some(due_date) = arg_optional_string(args, "dueDate")? {
        body["dueDate"] = json!(due_date);
    }
    if let Some(priority) = arg_optional_string(args, "priority")? {
        body["priority"] = json!(priority);
    }
    if let Some(parent) = arg_optional_string(args, "parentTaskId")? {
        body["parentPostId"] = json!(parent);
    }
    if let Some(member_ids) = arg_optional_string_array(args, "toMemberIds")? {
        let to: Vec<Value> = member_ids
            .iter()
            .map(|id| json!({ "type": "member", "member": { "organizationMemberId": id } }))
            .collect();
        body["users"] = json!({ "to": to });
    }

    let payload = client
        .post(&format!("/project/v1/projects/{project_id}/posts"), &body)
        .await?;
    format_payload(&payload)
}

async fn update_task(
    client: &DoorayClient,
    args: &Map<String, Value>,
) -> Result<String, DoorayError> {
    let project_id = required_string(args, "projectId")?;
    let task_id = required_string(args, "taskId")?;

    let mut body = json!({});
    if let Some(subject) = arg_optional_string(args, "subject")? {
        body["subject"] = json!(subject);
    }
    if let Some(content) = arg_optional_string(args, "body")? {
        body["body"] = markdown_body(&content);
    }
    if let Some(due_date) = arg_optional_string(args, "dueDate")? {
        body["dueDate"] = json!(due_date);
    }
    if let Some(priority) = arg_optional_string(args, "priority")? {
        body["priority"] = json!(priority);
    }
    if body.as_object().is_some_and(Map::is_empty) {
        return Err(DoorayError::validation(
            "provide at least one of 'subject', 'body', 'dueDate', 'priority'",
        ));
    }

    let payload = client
        .put(
            &format!("/project/v1/projects/{project_id}/posts/{task_id}"),
            &body,
        )
        .await?;
    format_payload(&payload)
}

async fn set_task_workflow(
    client: &DoorayClient,
    args: &Map<String, Value>,
) -> Result<String, DoorayError> {
    let project_id = required_string(args, "projectId")?;
    let task_id = required_string(args, "taskId")?;
    let workflow_id = required_string(args, "workflowId")?;
    let payload = client
        .put(
            &format!("/project/v1/projects/{project_id}/posts/{task_id}/workflow"),
            &json!({ "workflowId": workflow_id }),
        )
        .await?;
    format_payload(&payload)
}

async fn get_task_comment_list(
    client: &DoorayClient,
    args: &Map<String, Value>,
) -> Result<String, DoorayError> {
    let project_id = required_string(args, "projectId")?;
    let task_id = required_string(args, "taskId")?;
    let query = page_query(args)?;
    let page = client
        .get_paginated(
            &format!("/project/v1/projects/{project_id}/posts/{task_id}/logs"),
            &query,
        )
        .await?;
    format_page(&page)
}

async fn create_task_comment(
    client: &DoorayClient,
    args: &Map<String, Value>,
) -> Result<String, DoorayError> {
    let project_id = required_string(args, "projectId")?;
    let task_id = required_string(args, "taskId")?;
    let content = required_string(args, "content")?;
    let payload = client
        .post(
            &format!("/project/v1/projects/{project_id}/posts/{task_id}/logs"),
            &json!({ "body": markdown_body(&content) }),
        )
        .await?;
    format_payload(&payload)
}

async fn delete_task_comment(
    client: &DoorayClient,
    args: &Map<String, Value>,
) -> Result<String, DoorayError> {
    let project_id = required_string(args, "projectId")?;
    let task_id = required_string(args, "taskId")?;
    let comment_id = required_string(args, "commentId")?;
    client
        .delete(&format!(
            "/project/v1/projects/{project_id}/posts/{task_id}/logs/{comment_id}"
        ))
        .await?;
    format_payload(&json!({ "commentId": comment_id, "deleted": true }))
}

async fn get_tag_list(
    client: &DoorayClient,
    args: &Map<String, Value>,
) -> Result<String, DoorayError> {
    let project_id = required_string(args, "projectId")?;
    let query = page_query(args)?;
    let page = client
        .get_paginated(&format!("/project/v1/projects/{project_id}/tags"), &query)
        .await?;
    format_page(&page)
}

async fn create_tag(
    client: &DoorayClient,
    args: &Map<String, Value>,
) -> Result<String, DoorayError> {
    let project_id = required_string(args, "projectId")?;
    let name = required_string(args, "name")?;
    let mut body = json!({ "name": name });
    if let Some(color) = arg_optional_string(args, "color")? {
        body["color"] = json!(color);
    }
    let payload = client
        .post(&format!("/project/v1/projects/{project_id}/tags"), &body)
        .await?;
    format_payload(&payload)
}

async fn get_template_list(
    client: &DoorayClient,
    args: &Map<String, Value>,
) -> Result<String, DoorayError> {
    let project_id = required_string(args, "projectId")?;
    let query = page_query(args)?;
    let page = client
        .get_paginated(
            &format!("/project/v1/projects/{project_id}/templates"),
            &query,
        )
        .await?;
    format_page(&page)
}

async fn get_template(
    client: &DoorayClient,
    args: &Map<String, Value>,
) -> Result<String, DoorayError> {
    let project_id = required_string(args, "projectId")?;
    let template_id = required_string(args, "templateId")?;
    let payload = client
        .get(
            &format!("/project/v1/projects/{project_id}/templates/{template_id}"),
            &[],
        )
        .await?;
    format_payload(&payload)
}

async fn get_wiki_list(
    client: &DoorayClient,
    args: &Map<String, Value>,
) -> Result<String, DoorayError> {
    let query = page_query(args)?;
    let page = client.get_paginated("/wiki/v1/wikis", &query).await?;
    format_page(&page)
}

async fn get_wiki_page_list(
    client: &DoorayClient,
    args: &Map<String, Value>,
) -> Result<String, DoorayError> {
    let wiki_id = required_string(args, "wikiId")?;
    let mut query = page_query(args)?;
    if let Some(parent) = arg_optional_string(args, "parentPageId")? {
        query.push(("parentPageId".to_string(), parent));
    }
    let page = client
        .get_paginated(&format!("/wiki/v1/wikis/{wiki_id}/pages"), &query)
        .await?;
    format_page(&page)
}

async fn get_wiki_page(
    client: &DoorayClient,
    args: &Map<String, Value>,
) -> Result<String, DoorayError> {
    let wiki_id = required_string(args, "wikiId")?;
    let page_id = required_string(args, "pageId")?;
    let payload = client
        .get(&format!("/wiki/v1/wikis/{wiki_id}/pages/{page_id}"), &[])
        .await?;
    format_payload(&payload)
}

async fn create_wiki_page(
    client: &DoorayClient,
    args: &Map<String, Value>,
) -> Result<String, DoorayError> {
    let wiki_id = required_string(args, "wikiId")?;
    let subject = required_string(args, "subject")?;
    let content = required_string(args, "content")?;
    let mut body = json!({ "subject": subject, "body": markdown_body(&content) });
    if let Some(parent) = arg_optional_string(args, "parentPageId")? {
        body["parentPageId"] = json!(parent);
    }
    let payload = client
        .post(&format!("/wiki/v1/wikis/{wiki_id}/pages"), &body)
        .await?;
    format_payload(&payload)
}

async fn update_wiki_page(
    client: &DoorayClient,
    args: &Map<String, Value>,
) -> Result<String, DoorayError> {
    let wiki_id = required_string(args, "wikiId")?;
    let page_id = required_string(args, "pageId")?;

    let mut body = json!({});
    if let Some(subject) = arg_optional_string(args, "subject")? {
        body["subject"] = json!(subject);
    }
    if let Some(content) = arg_optional_string(args, "content")? {
        body["body"] = markdown_body(&content);
    }
    if body.as_object().is_some_and(Map::is_empty) {
        return Err(DoorayError::validation(
            "provide at least one of 'subject', 'content'",
        ));
    }

    let payload = client
        .put(&format!("/wiki/v1/wikis/{wiki_id}/pages/{page_id}"), &body)
        .await?;
    format_payload(&payload)
}

async fn get_drive_list(
    client: &DoorayClient,
    args: &Map<String, Value>,
) -> Result<String, DoorayError> {
    let query = page_query(args)?;
    let page = client.get_paginated("/drive/v1/drives", &query).await?;
    format_page(&page)
}

async fn get_drive_file_list(
    client: &DoorayClient,
    args: &Map<String, Value>,
) -> Result<String, DoorayError> {
    let drive_id = required_string(args, "driveId")?;
    let query = page_query(args)?;
    let page = client
        .get_paginated(&format!("/drive/v1/drives/{drive_id}/files"), &query)
        .await?;
    format_page(&page)
}

async fn get_drive_file_metadata(
    client: &DoorayClient,
    args: &Map<String, Value>,
) -> Result<String, DoorayError> {
    let drive_id = required_string(args, "driveId")?;
    let file_id = required_string(args, "fileId")?;
    let payload = client
        .get(
            &format!("/drive/v1/drives/{drive_id}/files/{file_id}"),
            &[("media".to_string(), "meta".to_string())],
        )
        .await?;
    format_payload(&payload)
}

async fn download_drive_file(
    client: &DoorayClient,
    args: &Map<String, Value>,
) -> Result<String, DoorayError> {
    let drive_id = required_string(args, "driveId")?;
    let file_id = required_string(args, "fileId")?;
    let destination = required_string(args, "destinationPath")?;

    let download = client
        .download_file(
            &format!("/drive/v1/drives/{drive_id}/files/{file_id}"),
            &[("media".to_string(), "raw".to_string())],
        )
        .await?;

    let filename = download
        .content_disposition
        .as_deref()
        .and_then(filename_from_content_disposition);

    let mut target = PathBuf::from(&destination);
    if let Ok(meta) = tokio::fs::metadata(&target).await {
        if meta.is_dir() {
            target = target.join(filename.clone().unwrap_or_else(|| file_id.clone()));
        }
    }
    tokio::fs::write(&target, &download.bytes).await?;

    format_payload(&json!({
        "savedTo": target.display().to_string(),
        "fileName": filename,
        "contentType": download.content_type,
        "size": download.bytes.len(),
    }))
}

async fn upload_drive_file(
    client: &DoorayClient,
    args: &Map<String, Value>,
) -> Result<String, DoorayError> {
    let drive_id = required_string(args, "driveId")?;
    let source = required_string(args, "sourcePath")?;

    let bytes = tokio::fs::read(&source).await?;
    let filename = match arg_optional_string(args, "fileName")? {
        Some(name) => name,
        None => Path::new(&source)
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                DoorayError::validation("could not derive a file name from 'sourcePath'")
            })?,
    };

    let payload = client
        .upload_file(
            &format!("/drive/v1/drives/{drive_id}/files"),
            bytes,
            &filename,
        )
        .await?;
    format_payload(&payload)
}

async fn api_request(
    client: &DoorayClient,
    args: &Map<String, Value>,
) -> Result<String, DoorayError> {
    let method = match required_string(args, "method")?.to_uppercase().as_str() {
        "GET" => Method::GET,
        "POST" => Method::POST,
        "PUT" => Method::PUT,
        "PATCH" => Method::PATCH,
        "DELETE" => Method::DELETE,
        other => {
            return Err(DoorayError::validation(format!(
                "'method' must be one of GET, POST, PUT, PATCH, DELETE (got '{other}')"
            )));
        }
    };
    let path = normalize_api_path(&required_string(args, "path")?)?;
    let query = parse_query_pairs(args.get("query"))?;
    let body = args.get("body").cloned();

    let payload = client.request(method, &path, &query, body.as_ref()).await?;
    format_payload(&payload)
}

fn markdown_body(content: &str) -> Value {
    json!({ "mimeType": "text/x-markdown", "content": content })
}

fn format_payload(payload: &Value) -> Result<String, DoorayError> {
    serde_json::to_string(payload)
        .map_err(|e| DoorayError::transport(format!("failed to encode payload: {e}")))
}

fn format_page(page: &Page) -> Result<String, DoorayError> {
    format_payload(&json!({ "totalCount": page.total_count, "items": page.data }))
}

fn normalize_api_path(raw: &str) -> Result<String, DoorayError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DoorayError::validation("'path' must not be empty"));
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        return Err(DoorayError::validation(
            "pass an API path only (e.g. /project/v1/projects), not a full URL",
        ));
    }
    if trimmed.starts_with('/') {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("/{trimmed}"))
    }
}

fn parse_query_pairs(query_value: Option<&Value>) -> Result<Vec<(String, String)>, DoorayError> {
    let Some(query_value) = query_value else {
        return Ok(Vec::new());
    };
    let Some(object) = query_value.as_object() else {
        return Err(DoorayError::validation("'query' must be an object"));
    };
    let mut pairs = Vec::new();
    for (key, value) in object {
        let rendered = match value {
            Value::String(v) => v.clone(),
            Value::Number(v) => v.to_string(),
            Value::Bool(v) => v.to_string(),
            Value::Null => continue,
            _ => {
                return Err(DoorayError::validation(format!(
                    "query value for '{key}' must be a scalar"
                )));
            }
        };
        pairs.push((key.clone(), rendered));
    }
    Ok(pairs)
}

fn page_query(args: &Map<String, Value>) -> Result<Vec<(String, String)>, DoorayError> {
    let mut query = Vec::new();
    if let Some(page) = arg_optional_u64(args, "page")? {
        query.push(("page".to_string(), page.to_string()));
    }
    if let Some(size) = arg_optional_u64(args, "size")? {
        query.push(("size".to_string(), size.to_string()));
    }
    Ok(query)
}

fn required_string(args: &Map<String, Value>, key: &str) -> Result<String, DoorayError> {
    match args.get(key) {
        None | Some(Value::Null) => Err(DoorayError::validation(format!(
            "missing required field '{key}'"
        ))),
        Some(Value::String(v)) if !v.trim().is_empty() => Ok(v.clone()),
        Some(Value::String(_)) => {
            Err(DoorayError::validation(format!("'{key}' must not be empty")))
        }
        Some(_) => Err(DoorayError::validation(format!("'{key}' must be a string"))),
    }
}

fn arg_optional_string(
    args: &Map<String, Value>,
    key: &str,
) -> Result<Option<String>, DoorayError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(v)) if v.trim().is_empty() => Ok(None),
        Some(Value::String(v)) => Ok(Some(v.clone())),
        Some(_) => Err(DoorayError::validation(format!("'{key}' must be a string"))),
    }
}

fn arg_optional_u64(args: &Map<String, Value>, key: &str) -> Result<Option<u64>, DoorayError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_u64().map(Some).ok_or_else(|| {
            DoorayError::validation(format!("'{key}' must be an unsigned integer"))
        }),
        Some(_) => Err(DoorayError::validation(format!(
            "'{key}' must be an unsigned integer"
        ))),
    }
}

fn arg_optional_string_array(
    args: &Map<String, Value>,
    key: &str,
) -> Result<Option<Vec<String>>, DoorayError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(v) if !v.trim().is_empty() => values.push(v.clone()),
                    _ => {
                        return Err(DoorayError::validation(format!(
                            "'{key}' must be an array of non-empty strings"
                        )));
                    }
                }
            }
            Ok(Some(values))
        }
        Some(_) => Err(DoorayError::validation(format!("'{key}' must be an array"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Credential;
    use crate::testing::{http_stub, json_response, redirect_response};
    use serde_json::json;
    use std::collections::HashSet;

    fn dead_client() -> DoorayClient {
        // Port 9 (discard) is expected to refuse connections.
        DoorayClient::new(Credential {
            token: "test-token".to_string(),
            base_url: "http://127.0.0.1:9".to_string(),
        })
        .unwrap()
    }

    fn stub_client(base_url: &str) -> DoorayClient {
        DoorayClient::new(Credential {
            token: "test-token".to_string(),
            base_url: base_url.to_string(),
        })
        .unwrap()
    }

    fn args(raw: Value) -> Map<String, Value> {
        raw.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn tool_names_are_unique() {
        let definitions = tool_definitions();
        let names: HashSet<&str> = definitions.iter().map(|tool| tool.name).collect();
        assert_eq!(names.len(), definitions.len());
    }

    #[test]
    fn every_schema_is_a_closed_object_with_known_required_fields() {
        for tool in tool_definitions() {
            let schema = tool.input_schema.as_object().expect(tool.name);
            assert_eq!(
                schema.get("type").and_then(Value::as_str),
                Some("object"),
                "{} schema must be an object",
                tool.name
            );
            assert_eq!(
                schema.get("additionalProperties").and_then(Value::as_bool),
                Some(false),
                "{} schema must reject unknown fields",
                tool.name
            );
            let properties = schema
                .get("properties")
                .and_then(Value::as_object)
                .expect(tool.name);
            if let Some(required) = schema.get("required").and_then(Value::as_array) {
                for key in required.iter().filter_map(Value::as_str) {
                    assert!(
                        properties.contains_key(key),
                        "{}: required field '{}' has no property entry",
                        tool.name,
                        key
                    );
                }
            }
        }
    }

    #[tokio::test]
    async fn every_defined_tool_has_a_dispatch_arm() {
        let client = dead_client();
        for tool in tool_definitions() {
            if let Err(err) = execute_tool(&client, tool.name, &Map::new()).await {
                assert!(
                    !err.to_string().contains("no handler registered"),
                    "tool '{}' is defined but not dispatched",
                    tool.name
                );
            }
        }
    }

    #[tokio::test]
    async fn create_task_posts_subject_to_the_project_posts_path() {
        let created = json!({
            "header": { "success": true, "message": "" },
            "result": { "id": "t-100" }
        });
        let (base, stub) = http_stub(vec![json_response("200 OK", &created.to_string())]).await;

        let text = execute_tool(
            &stub_client(&base),
            "create-task",
            &args(json!({ "projectId": "p1", "subject": "ship it", "priority": "high" })),
        )
        .await
        .unwrap();
        assert_eq!(text, "{\"id\":\"t-100\"}");

        let seen = stub.await.unwrap();
        assert!(seen[0].starts_with("POST /project/v1/projects/p1/posts"));
        assert!(seen[0].contains("\"subject\":\"ship it\""));
        assert!(seen[0].contains("\"priority\":\"high\""));
    }

    #[tokio::test]
    async fn update_task_requires_at_least_one_field() {
        let err = execute_tool(
            &dead_client(),
            "update-task",
            &args(json!({ "projectId": "p1", "taskId": "t1" })),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DoorayError::Validation { .. }));
    }

    #[tokio::test]
    async fn get_task_list_formats_the_page_with_its_total_count() {
        let listing = json!({
            "header": { "success": true, "message": "" },
            "result": [ { "id": "t1" } ],
            "totalCount": 41
        });
        let (base, stub) = http_stub(vec![json_response("200 OK", &listing.to_string())]).await;

        let text = execute_tool(
            &stub_client(&base),
            "get-task-list",
            &args(json!({ "projectId": "p1", "size": 1 })),
        )
        .await
        .unwrap();
        assert_eq!(text, "{\"items\":[{\"id\":\"t1\"}],\"totalCount\":41}");

        let seen = stub.await.unwrap();
        assert!(seen[0].contains("size=1"));
    }

    #[tokio::test]
    async fn download_tool_saves_into_a_directory_using_the_remote_filename() {
        let response = "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Disposition: attachment; filename=\"minutes.txt\"\r\nContent-Length: 7\r\nConnection: close\r\n\r\nminutes".to_string();
        let (base, stub) = http_stub(vec![redirect_response("/storage/m-1"), response]).await;
        let dir = tempfile::tempdir().unwrap();

        let text = execute_tool(
            &stub_client(&base),
            "download-drive-file",
            &args(json!({
                "driveId": "d1",
                "fileId": "f1",
                "destinationPath": dir.path().to_str().unwrap()
            })),
        )
        .await
        .unwrap();

        let saved = dir.path().join("minutes.txt");
        assert_eq!(std::fs::read_to_string(&saved).unwrap(), "minutes");
        assert!(text.contains("\"fileName\":\"minutes.txt\""));
        assert_eq!(stub.await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn download_tool_honors_an_explicit_file_destination() {
        let response = "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 4\r\nConnection: close\r\n\r\ndata".to_string();
        let (base, stub) = http_stub(vec![response]).await;
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("explicit-name.bin");

        execute_tool(
            &stub_client(&base),
            "download-drive-file",
            &args(json!({
                "driveId": "d1",
                "fileId": "f1",
                "destinationPath": destination.to_str().unwrap()
            })),
        )
        .await
        .unwrap();

        assert_eq!(std::fs::read(&destination).unwrap(), b"data");
        stub.await.unwrap();
    }

    #[tokio::test]
    async fn upload_tool_reads_the_source_file_and_returns_the_remote_result() {
        let done = json!({
            "header": { "success": true, "message": "" },
            "result": { "id": "f9" }
        });
        let (base, stub) = http_stub(vec![json_response("200 OK", &done.to_string())]).await;
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("notes.md");
        std::fs::write(&source, "hello drive").unwrap();

        let text = execute_tool(
            &stub_client(&base),
            "upload-drive-file",
            &args(json!({ "driveId": "d1", "sourcePath": source.to_str().unwrap() })),
        )
        .await
        .unwrap();
        assert_eq!(text, "{\"id\":\"f9\"}");

        let seen = stub.await.unwrap();
        assert!(seen[0].contains("filename=\"notes.md\""));
        assert!(seen[0].contains("hello drive"));
    }

    #[tokio::test]
    async fn upload_tool_surfaces_a_missing_source_as_an_io_fault() {
        let err = execute_tool(
            &dead_client(),
            "upload-drive-file",
            &args(json!({ "driveId": "d1", "sourcePath": "/nonexistent/path/of/file.txt" })),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DoorayError::Io(_)));
    }

    #[test]
    fn normalize_api_path_adds_a_leading_slash() {
        assert_eq!(
            normalize_api_path("project/v1/projects").unwrap(),
            "/project/v1/projects"
        );
        assert_eq!(
            normalize_api_path("/project/v1/projects").unwrap(),
            "/project/v1/projects"
        );
    }

    #[test]
    fn normalize_api_path_rejects_full_urls() {
        assert!(normalize_api_path("https://api.dooray.com/project/v1/projects").is_err());
    }

    #[test]
    fn parse_query_pairs_renders_scalars_and_skips_nulls() {
        let pairs = parse_query_pairs(Some(&json!({
            "page": 2,
            "member": "me",
            "archived": false,
            "unused": null
        })))
        .unwrap();
        assert_eq!(pairs.len(), 3);
        assert!(pairs.contains(&("page".to_string(), "2".to_string())));
        assert!(pairs.contains(&("archived".to_string(), "false".to_string())));
    }

    #[test]
    fn parse_query_pairs_rejects_nested_values() {
        assert!(parse_query_pairs(Some(&json!({ "filter": { "a": 1 } }))).is_err());
    }
}
