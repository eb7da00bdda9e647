use std::sync::Arc;

use clap::{Args, Subcommand};
use serde_json::{Map, Value, json};
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use uuid::Uuid;

pub mod client;
mod schema;
pub mod tools;
pub mod util;

#[cfg(test)]
pub(crate) mod testing;

use client::{Credential, DoorayClient};
use dooray_core::error::DoorayError;
use util::{resolve_token, to_pretty_json};

const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
const MCP_SERVER_NAME: &str = "dooray-mcp";

#[derive(Subcommand)]
pub enum McpCommands {
    /// Run the Dooray MCP server over stdio
    Serve(McpServeArgs),
    /// Check connectivity and credentials, then print a readiness report
    Diagnose(McpDiagnoseArgs),
}

#[derive(Args, Clone, Debug)]
pub struct McpServeArgs {
    /// Explicit API token override (otherwise DOORAY_API_TOKEN)
    #[arg(long, env = "DOORAY_MCP_TOKEN")]
    pub token: Option<String>,
}

#[derive(Args, Clone, Debug)]
pub struct McpDiagnoseArgs {
    /// Explicit API token override (otherwise DOORAY_API_TOKEN)
    #[arg(long, env = "DOORAY_MCP_TOKEN")]
    pub token: Option<String>,
}

pub async fn run(api_url: &str, command: McpCommands) -> i32 {
    match command {
        McpCommands::Serve(args) => {
            let server = match McpServer::new(api_url, args.token) {
                Ok(server) => server,
                Err(message) => {
                    let payload = json!({ "error": "credential_missing", "message": message });
                    eprintln!("{}", to_pretty_json(&payload));
                    return 1;
                }
            };
            match server.serve_stdio().await {
                Ok(()) => 0,
                Err(err) => {
                    let payload = json!({ "error": "mcp_server_error", "message": err });
                    eprintln!("{}", to_pretty_json(&payload));
                    1
                }
            }
        }
        McpCommands::Diagnose(args) => {
            let server = match McpServer::new(api_url, args.token) {
                Ok(server) => server,
                Err(message) => {
                    let payload = json!({ "error": "credential_missing", "message": message });
                    eprintln!("{}", to_pretty_json(&payload));
                    return 1;
                }
            };
            let report = server.run_diagnostics().await;
            println!("{}", to_pretty_json(&report));
            if report.get("status").and_then(Value::as_str) == Some("ready") {
                0
            } else {
                2
            }
        }
    }
}

pub struct McpServer {
    client: DoorayClient,
    session_id: String,
}

impl McpServer {
    /// Builds the server with a resolved credential. The token is the only
    /// piece of state shared between calls and is never mutated afterwards.
    pub fn new(api_url: &str, explicit_token: Option<String>) -> Result<Self, String> {
        let token = resolve_token(explicit_token)?;
        let client = DoorayClient::new(Credential {
            token,
            base_url: api_url.to_string(),
        })
        .map_err(|e| e.to_string())?;
        Ok(Self {
            client,
            session_id: format!("stdio-{}", Uuid::now_v7()),
        })
    }

    /// Serves newline-delimited JSON-RPC over stdio. Each incoming message
    /// runs on its own task; responses are funneled through a channel to a
    /// single stdout writer, so calls complete in any order and the id field
    /// correlates them.
    pub async fn serve_stdio(self) -> Result<(), String> {
        self.emit_startup_status();
        let server = Arc::new(self);

        let (tx, mut rx) = mpsc::channel::<Value>(32);
        let writer = tokio::spawn(async move {
            let mut stdout = io::stdout();
            while let Some(response) = rx.recv().await {
                let mut line = match serde_json::to_vec(&response) {
                    Ok(line) => line,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to serialize MCP response");
                        continue;
                    }
                };
                line.push(b'\n');
                if stdout.write_all(&line).await.is_err() {
                    break;
                }
                let _ = stdout.flush().await;
            }
        });

        let stdin = io::stdin();
        let mut reader = BufReader::new(stdin);
        let mut line = String::new();
        loop {
            line.clear();
            let read = reader
                .read_line(&mut line)
                .await
                .map_err(|e| format!("failed to read MCP message: {e}"))?;
            if read == 0 {
                break;
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let incoming: Value = match serde_json::from_str(trimmed) {
                Ok(value) => value,
                Err(e) => {
                    let response = error_response(
                        Value::Null,
                        RpcError::parse_error(format!("invalid JSON: {e}")),
                    );
                    if tx.send(response).await.is_err() {
                        break;
                    }
                    continue;
                }
            };

            let server = Arc::clone(&server);
            let tx = tx.clone();
            tokio::spawn(async move {
                for response in server.handle_incoming_message(incoming).await {
                    if tx.send(response).await.is_err() {
                        break;
                    }
                }
            });
        }

        drop(tx);
        let _ = writer.await;
        Ok(())
    }

    fn emit_startup_status(&self) {
        let payload = json!({
            "event": "mcp_startup",
            "server": MCP_SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION"),
            "api_url": self.client.base_url(),
            "session_id": self.session_id,
            "started_at": chrono::Utc::now().to_rfc3339(),
        });
        eprintln!("{}", to_pretty_json(&payload));
        tracing::info!(api_url = self.client.base_url(), "dooray mcp server started");
    }

    async fn run_diagnostics(&self) -> Value {
        match self.client.get("/common/v1/members/me", &[]).await {
            Ok(member) => json!({
                "status": "ready",
                "api_url": self.client.base_url(),
                "member": member,
            }),
            Err(err) => {
                let status = match err {
                    DoorayError::Authentication => "auth_failed",
                    _ => "unreachable",
                };
                json!({
                    "status": status,
                    "api_url": self.client.base_url(),
                    "message": err.to_string(),
                })
            }
        }
    }

    async fn handle_incoming_message(&self, incoming: Value) -> Vec<Value> {
        let mut responses = Vec::new();

        if let Some(batch) = incoming.as_array() {
            if batch.is_empty() {
                responses.push(error_response(
                    Value::Null,
                    RpcError::invalid_request("Batch request must not be empty"),
                ));
                return responses;
            }
            for item in batch {
                if let Some(response) = self.handle_single_message(item.clone()).await {
                    responses.push(response);
                }
            }
            return responses;
        }

        if let Some(response) = self.handle_single_message(incoming).await {
            responses.push(response);
        }
        responses
    }

    async fn handle_single_message(&self, incoming: Value) -> Option<Value> {
        let Some(obj) = incoming.as_object() else {
            return Some(error_response(
                Value::Null,
                RpcError::invalid_request("Request must be a JSON object"),
            ));
        };

        if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            let id = obj.get("id").cloned().unwrap_or(Value::Null);
            return Some(error_response(
                id,
                RpcError::invalid_request("jsonrpc must be '2.0'"),
            ));
        }

        let Some(method) = obj.get("method").and_then(Value::as_str) else {
            // Most likely a client response; this server issues no outbound requests.
            return None;
        };

        let params = obj.get("params").cloned().unwrap_or(Value::Null);
        if let Some(id) = obj.get("id").cloned() {
            let result = self.handle_request(method, params).await;
            Some(match result {
                Ok(payload) => success_response(id, payload),
                Err(err) => error_response(id, err),
            })
        } else {
            // Notification: nothing to answer. Known kinds are no-ops,
            // unknown ones are intentionally ignored.
            None
        }
    }

    async fn handle_request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(self.initialize_payload()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(tools_list_payload()),
            "tools/call" => self.handle_tools_call(params).await,
            "resources/list" => Ok(resources_list_payload()),
            "resources/read" => handle_resources_read(params),
            "prompts/list" => Ok(prompts_list_payload()),
            "prompts/get" => handle_prompts_get(params),
            _ => Err(RpcError::method_not_found(method)),
        }
    }

    fn initialize_payload(&self) -> Value {
        json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {
                "tools": { "listChanged": false },
                "resources": { "listChanged": false },
                "prompts": { "listChanged": false }
            },
            "serverInfo": {
                "name": MCP_SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION")
            },
            "instructions": "Tools mirror the Dooray REST API: projects and tasks, wiki pages, drive files, tags, and templates. Start with get-my-member-info to confirm credentials. List tools return a totalCount alongside items; pass page/size to paginate. download-drive-file and upload-drive-file move file content between Dooray drive and the local filesystem."
        })
    }

    async fn handle_tools_call(&self, params: Value) -> Result<Value, RpcError> {
        let params = params
            .as_object()
            .ok_or_else(|| RpcError::invalid_params("tools/call params must be an object"))?;

        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("tools/call requires string field 'name'"))?;

        let args = match params.get("arguments") {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(_) => {
                return Err(RpcError::invalid_params(
                    "tools/call 'arguments' must be an object",
                ));
            }
        };

        Ok(self.dispatch(name, &args).await)
    }

    /// Turns an untrusted (name, arguments) pair into a tool result. Every
    /// failure mode lands here as an error-flagged result; nothing below
    /// this point may surface as a protocol error, because the caller
    /// expects exactly one structured response per request.
    pub async fn dispatch(&self, name: &str, args: &Map<String, Value>) -> Value {
        let Some(tool) = tools::find_tool(name) else {
            return tool_result(format!("Error: Unknown tool '{name}'"), true);
        };

        if let Err(problems) = schema::validate_arguments(&tool.input_schema, args) {
            return tool_result(format!("Validation Error: {}", problems.join(", ")), true);
        }

        match tools::execute_tool(&self.client, name, args).await {
            Ok(text) => tool_result(text, false),
            Err(err) => {
                tracing::debug!(tool = name, error = %err, "tool call failed");
                tool_result(error_text(&err), true)
            }
        }
    }
}

/// Category prefixes signal the fault class to the calling agent without
/// structured fields: remote-reported failures get the API prefix, local
/// validation its own, and everything else a plain `Error:`.
fn error_text(err: &DoorayError) -> String {
    match err {
        DoorayError::Validation { messages } => {
            format!("Validation Error: {}", messages.join(", "))
        }
        DoorayError::Remote {
            message,
            status_code,
            ..
        } => match status_code {
            Some(status) => format!("Dooray API Error: {message} (HTTP {status})"),
            None => format!("Dooray API Error: {message}"),
        },
        other => format!("Error: {other}"),
    }
}

fn tool_result(text: String, is_error: bool) -> Value {
    json!({
        "content": [{ "type": "text", "text": text }],
        "isError": is_error
    })
}

fn tools_list_payload() -> Value {
    let tools: Vec<Value> = tools::tool_definitions()
        .into_iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "inputSchema": tool.input_schema,
            })
        })
        .collect();
    json!({ "tools": tools })
}

struct ResourceDefinition {
    uri: &'static str,
    name: &'static str,
    description: &'static str,
    text: &'static str,
}

const GETTING_STARTED_GUIDE: &str = "\
# Dooray MCP — Getting started

Set `DOORAY_API_TOKEN` to a personal API token (Dooray settings → API) and,
for self-hosted tenants, `DOORAY_API_URL` to the tenant endpoint. Run
`dooray-mcp diagnose` to verify both before wiring the server into an agent.

Every call is authenticated with the token configured at startup; there is
no per-call credential switching. Remote failures come back as error-flagged
tool results prefixed with `Dooray API Error:` — the call can simply be
retried or corrected and reissued.";

const TOOL_GUIDE: &str = "\
# Dooray MCP — Tool map

- Identity: get-my-member-info
- Projects: get-project-list, get-project, create-project
- Tasks: get-task-list, get-task, create-task, update-task, set-task-workflow
- Comments: get-task-comment-list, create-task-comment, delete-task-comment
- Tags and templates: get-tag-list, create-tag, get-template-list, get-template
- Wiki: get-wiki-list, get-wiki-page-list, get-wiki-page, create-wiki-page, update-wiki-page
- Drive: get-drive-list, get-drive-file-list, get-drive-file-metadata, download-drive-file, upload-drive-file
- Escape hatch: api-request (arbitrary verb + path)

List tools accept `page`/`size` and report the server-side `totalCount`
next to the returned items.";

fn resource_definitions() -> Vec<ResourceDefinition> {
    vec![
        ResourceDefinition {
            uri: "dooray://guide/getting-started",
            name: "Getting Started",
            description: "Credential setup and failure-handling basics",
            text: GETTING_STARTED_GUIDE,
        },
        ResourceDefinition {
            uri: "dooray://guide/tools",
            name: "Tool Map",
            description: "The tool surface grouped by Dooray resource",
            text: TOOL_GUIDE,
        },
    ]
}

fn resources_list_payload() -> Value {
    let resources: Vec<Value> = resource_definitions()
        .into_iter()
        .map(|resource| {
            json!({
                "uri": resource.uri,
                "name": resource.name,
                "description": resource.description,
                "mimeType": "text/markdown",
            })
        })
        .collect();
    json!({ "resources": resources })
}

fn handle_resources_read(params: Value) -> Result<Value, RpcError> {
    let params = params
        .as_object()
        .ok_or_else(|| RpcError::invalid_params("resources/read params must be an object"))?;
    let uri = params
        .get("uri")
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::invalid_params("resources/read requires string field 'uri'"))?;

    let resource = resource_definitions()
        .into_iter()
        .find(|resource| resource.uri == uri)
        .ok_or_else(|| RpcError::invalid_params(format!("Unknown resource uri '{uri}'")))?;

    Ok(json!({
        "contents": [{
            "uri": resource.uri,
            "mimeType": "text/markdown",
            "text": resource.text,
        }]
    }))
}

struct PromptDefinition {
    name: &'static str,
    description: &'static str,
    arguments: &'static [(&'static str, &'static str)],
}

fn prompt_definitions() -> Vec<PromptDefinition> {
    vec![
        PromptDefinition {
            name: "triage-project-tasks",
            description: "Review open tasks in a project and propose priorities",
            arguments: &[("projectId", "Project to triage")],
        },
        PromptDefinition {
            name: "summarize-wiki",
            description: "Summarize the page tree of a wiki",
            arguments: &[("wikiId", "Wiki to summarize")],
        },
    ]
}

fn prompts_list_payload() -> Value {
    let prompts: Vec<Value> = prompt_definitions()
        .into_iter()
        .map(|prompt| {
            let arguments: Vec<Value> = prompt
                .arguments
                .iter()
                .map(|(name, description)| {
                    json!({ "name": name, "description": description, "required": true })
                })
                .collect();
            json!({
                "name": prompt.name,
                "description": prompt.description,
                "arguments": arguments,
            })
        })
        .collect();
    json!({ "prompts": prompts })
}

fn handle_prompts_get(params: Value) -> Result<Value, RpcError> {
    let params = params
        .as_object()
        .ok_or_else(|| RpcError::invalid_params("prompts/get params must be an object"))?;
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::invalid_params("prompts/get requires string field 'name'"))?;
    let arguments = params
        .get("arguments")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let argument = |key: &str| {
        arguments
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                RpcError::invalid_params(format!("prompt '{name}' requires argument '{key}'"))
            })
    };

    let text = match name {
        "triage-project-tasks" => {
            let project_id = argument("projectId")?;
            format!(
                "Triage the open tasks of Dooray project {project_id}. Call get-task-list with projectId={project_id} and workflowClass=registered, then workflowClass=working. For each task, check the due date and priority, group the results into overdue / due this week / unscheduled, and propose a priority for every task that has none. Use update-task to apply priorities the user confirms."
            )
        }
        "summarize-wiki" => {
            let wiki_id = argument("wikiId")?;
            format!(
                "Summarize Dooray wiki {wiki_id}. Call get-wiki-page-list with wikiId={wiki_id} to map the page tree, then get-wiki-page for the top-level pages. Produce a short outline of what the wiki covers and flag pages that look stale or empty."
            )
        }
        _ => return Err(RpcError::invalid_params(format!("Unknown prompt '{name}'"))),
    };

    let definition = prompt_definitions()
        .into_iter()
        .find(|prompt| prompt.name == name);
    Ok(json!({
        "description": definition.map(|prompt| prompt.description).unwrap_or_default(),
        "messages": [{
            "role": "user",
            "content": { "type": "text", "text": text }
        }]
    }))
}

#[derive(Debug)]
struct RpcError {
    code: i64,
    message: String,
}

impl RpcError {
    fn parse_error(message: impl Into<String>) -> Self {
        Self {
            code: -32700,
            message: message.into(),
        }
    }

    fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: -32600,
            message: message.into(),
        }
    }

    fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {method}"),
        }
    }

    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: -32602,
            message: message.into(),
        }
    }
}

fn success_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

fn error_response(id: Value, error: RpcError) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": error.code,
            "message": error.message
        }
    })
}
