use gristdesk_common::protocol::bridge::{
    AppOpenParams, CreateDocParams, ImportDocParams, PathParams, StoragePathParams, StoragePathResult, UrlParams,
};
use gristdesk_common::protocol::jsonrpc::{
    Request, RequestId, Response, RpcError, APP_ERROR, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST,
    METHOD_NOT_FOUND, PARSE_ERROR,
};
use gristdesk_common::protocol::rpc_methods::{
    APP_OPEN, APP_OPEN_FILE, APP_RECENT_ITEMS, DOC_CREATE, DOC_IMPORT, DOC_STORAGE_PATH, MENU_FILE_NEW, MENU_FILE_OPEN,
    MENU_OPEN_RECENT, RPC_PING, WINDOW_CLOSED, WINDOW_LOADED, WINDOW_NAVIGATED, WINDOW_OPEN_URL,
};
use gristdesk_common::types::{NewDocument, WindowId};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tracing::warn;

use crate::dispatch::command::{AppCommand, CommandSender, Reply};
use crate::error::DesktopResult;

/// Shared by the instance socket and the window bridge.
#[derive(Clone)]
pub struct RpcState {
    commands: CommandSender,
}

impl RpcState {
    pub fn new(commands: CommandSender) -> Self {
        Self { commands }
    }

    async fn send(&self, command: AppCommand) -> Result<(), RpcError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| RpcError::new(INTERNAL_ERROR, "Internal error").with_data(json!({ "reason": "app is shutting down" })))
    }

    /// Send a command built around a reply channel and wait for the answer.
    async fn ask<T>(&self, build: impl FnOnce(Reply<T>) -> AppCommand) -> Result<T, RpcError> {
        let (reply, answer) = oneshot::channel();
        self.send(build(reply)).await?;
        answer
            .await
            .map_err(|_| RpcError::new(INTERNAL_ERROR, "Internal error").with_data(json!({ "reason": "request dropped" })))
    }
}

/// Decode one raw JSON-RPC message. Parse failures answer with a null id.
pub fn parse_raw_request(raw: &[u8]) -> Result<Request, Response> {
    let request = serde_json::from_slice::<Request>(raw).map_err(|error| {
        Response::error(
            RequestId::Null,
            RpcError {
                code: PARSE_ERROR,
                message: "Parse error".to_string(),
                data: Some(json!({ "reason": error.to_string() })),
            },
        )
    })?;

    if request.jsonrpc != "2.0" {
        return Err(Response::error(
            request.id,
            RpcError { code: INVALID_REQUEST, message: "Invalid Request".to_string(), data: None },
        ));
    }
    Ok(request)
}

// ── Instance socket ────────────────────────────────────────────────

pub async fn handle_raw_request(raw: &[u8], state: &RpcState) -> Response {
    match parse_raw_request(raw) {
        Ok(request) => dispatch_request(request, state).await,
        Err(response) => response,
    }
}

pub async fn dispatch_request(request: Request, state: &RpcState) -> Response {
    match request.method.as_str() {
        RPC_PING => Response::success(request.id, json!({ "ok": true })),
        APP_OPEN => handle_app_open(request, state).await,
        DOC_STORAGE_PATH => handle_storage_path(request, state).await,
        _ => method_not_found(request.id),
    }
}

async fn handle_app_open(request: Request, state: &RpcState) -> Response {
    let params: AppOpenParams = match parse_params(&request) {
        Ok(params) => params,
        Err(response) => return response,
    };
    respond(
        request.id,
        state.send(AppCommand::SecondInstance { argv: params.argv, cwd: params.cwd }).await.map(|()| json!({ "ok": true })),
    )
}

async fn handle_storage_path(request: Request, state: &RpcState) -> Response {
    let params: StoragePathParams = match parse_params(&request) {
        Ok(params) => params,
        Err(response) => return response,
    };
    let path = state.ask(|reply| AppCommand::StoragePath { doc_id: params.doc_id, reply }).await;
    respond(request.id, path.map(|path| json!(StoragePathResult { path })))
}

// ── Window bridge ──────────────────────────────────────────────────

/// Handle one message from `window`'s bridge. Notifications get no response.
pub async fn dispatch_bridge_request(window: WindowId, request: Request, state: &RpcState) -> Option<Response> {
    if request.is_notification() {
        if let Err(error) = handle_bridge_notification(window, &request, state).await {
            warn!(window = %window, method = %request.method, reason = %error.message, "dropped bridge notification");
        }
        return None;
    }

    let response = match request.method.as_str() {
        DOC_CREATE => {
            let params: CreateDocParams = match parse_params_or_default(&request) {
                Ok(params) => params,
                Err(response) => return Some(response),
            };
            let created = state.ask(|reply| AppCommand::CreateDoc { window, path: params.path, reply }).await;
            respond(request.id, created.and_then(new_document_result))
        }
        DOC_IMPORT => {
            let params: ImportDocParams = match parse_params(&request) {
                Ok(params) => params,
                Err(response) => return Some(response),
            };
            let created = state
                .ask(|reply| AppCommand::ImportDoc { window, upload_id: params.upload_id, path: params.path, reply })
                .await;
            respond(request.id, created.and_then(new_document_result))
        }
        APP_RECENT_ITEMS => {
            let items = state.ask(|reply| AppCommand::RecentItems { reply }).await;
            respond(request.id, items.map(|items| json!({ "items": items })))
        }
        RPC_PING => Response::success(request.id, json!({ "ok": true })),
        _ => method_not_found(request.id),
    };
    Some(response)
}

async fn handle_bridge_notification(window: WindowId, request: &Request, state: &RpcState) -> Result<(), RpcError> {
    let command = match request.method.as_str() {
        WINDOW_NAVIGATED => {
            let params: UrlParams = decode_params(request)?;
            AppCommand::WindowNavigated { window, url: params.url }
        }
        WINDOW_OPEN_URL => {
            let params: UrlParams = decode_params(request)?;
            AppCommand::WindowOpenUrl { window, url: params.url }
        }
        WINDOW_LOADED => AppCommand::WindowLoaded { window },
        WINDOW_CLOSED => AppCommand::WindowClosed { window },
        APP_OPEN_FILE => {
            let params: PathParams = decode_params(request)?;
            AppCommand::OpenFile { path: params.path, requesting: Some(window) }
        }
        MENU_FILE_NEW => AppCommand::MenuFileNew,
        MENU_FILE_OPEN => {
            let params: PathParams = decode_params(request)?;
            AppCommand::MenuFileOpen { path: params.path, requesting: Some(window) }
        }
        MENU_OPEN_RECENT => {
            let params: PathParams = decode_params(request)?;
            AppCommand::OpenRecent { path: params.path }
        }
        other => return Err(RpcError::new(METHOD_NOT_FOUND, format!("unknown notification `{other}`"))),
    };
    state.send(command).await
}

// ── Helpers ────────────────────────────────────────────────────────

fn new_document_result(created: DesktopResult<Option<NewDocument>>) -> Result<Value, RpcError> {
    match created {
        Ok(doc) => Ok(json!(doc)),
        Err(error) => Err(RpcError::new(APP_ERROR, error.to_string())
            .with_data(json!({ "code": error.code(), "title": error.title() }))),
    }
}

fn respond(id: RequestId, result: Result<Value, RpcError>) -> Response {
    match result {
        Ok(value) => Response::success(id, value),
        Err(error) => Response::error(id, error),
    }
}

fn method_not_found(id: RequestId) -> Response {
    Response::error(
        id,
        RpcError { code: METHOD_NOT_FOUND, message: "Method not found".to_string(), data: None },
    )
}

fn decode_params<T: DeserializeOwned>(request: &Request) -> Result<T, RpcError> {
    let Some(params) = request.params.clone() else {
        return Err(invalid_params(format!("{} requires params", request.method)));
    };
    serde_json::from_value::<T>(params)
        .map_err(|error| invalid_params(format!("failed to decode {} params: {error}", request.method)))
}

fn parse_params<T: DeserializeOwned>(request: &Request) -> Result<T, Response> {
    decode_params(request).map_err(|error| Response::error(request.id.clone(), error))
}

fn parse_params_or_default<T: DeserializeOwned + Default>(request: &Request) -> Result<T, Response> {
    match request.params {
        None | Some(Value::Null) => Ok(T::default()),
        Some(_) => parse_params(request),
    }
}

fn invalid_params(reason: String) -> RpcError {
    RpcError { code: INVALID_PARAMS, message: "Invalid params".to_string(), data: Some(json!({ "reason": reason })) }
}
