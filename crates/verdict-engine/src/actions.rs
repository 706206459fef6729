//! Typed action dispatch.
//!
//! Actions are stored with a string kind tag; dispatch goes through a
//! handler registry keyed on the tag, so adding a kind means registering a
//! handler, not editing a switch. Unknown tags are an action-local
//! `UnsupportedAction` failure — the owning schedule still completes.
//!
//! Every successful execution appends `{timestamp, context}` to the
//! action's `params.executions` array and stamps `last_executed_at`:
//! an append-only history of what fired when, because of what decision.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use verdict_core::error::{Result, VerdictError};
use verdict_core::traits::{ActionStore, Reasoner, TreeStore};
use verdict_core::types::{Action, TreeNode};

/// Known action kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    EmailAlert,
    ApiCall,
    Notify,
    RefineTree,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::EmailAlert => "EMAIL_ALERT",
            ActionKind::ApiCall => "API_CALL",
            ActionKind::Notify => "NOTIFY",
            ActionKind::RefineTree => "REFINE_TREE",
        }
    }
}

/// Decision context handed to every handler.
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub tree_id: String,
    pub schedule_id: String,
    pub decision: bool,
    pub rationale: String,
}

impl ActionContext {
    fn to_json(&self) -> Value {
        json!({
            "tree_id": self.tree_id,
            "schedule_id": self.schedule_id,
            "decision": self.decision,
            "rationale": self.rationale,
        })
    }

    /// Replace `{tree_id}`-style placeholders in a template.
    fn apply_placeholders(&self, template: &str) -> String {
        template
            .replace("{tree_id}", &self.tree_id)
            .replace("{schedule_id}", &self.schedule_id)
            .replace("{decision}", if self.decision { "true" } else { "false" })
            .replace("{rationale}", &self.rationale)
    }
}

/// One handler per action kind.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    fn kind(&self) -> ActionKind;

    async fn run(&self, params: &Value, ctx: &ActionContext) -> Result<()>;
}

/// Handler registry + execution recorder.
pub struct ActionExecutor {
    handlers: HashMap<&'static str, Box<dyn ActionHandler>>,
    store: Arc<dyn ActionStore>,
}

impl ActionExecutor {
    /// Empty registry. Callers register the handlers they want.
    pub fn new(store: Arc<dyn ActionStore>) -> Self {
        Self {
            handlers: HashMap::new(),
            store,
        }
    }

    /// Registry with the built-in handlers.
    pub fn with_defaults(
        store: Arc<dyn ActionStore>,
        reasoner: Arc<dyn Reasoner>,
        trees: Arc<dyn TreeStore>,
    ) -> Self {
        let mut executor = Self::new(store);
        executor.register(Box::new(EmailAlertHandler));
        executor.register(Box::new(NotifyHandler));
        executor.register(Box::new(ApiCallHandler::new()));
        executor.register(Box::new(RefineTreeHandler { reasoner, trees }));
        executor
    }

    /// Register a handler; the latest registration for a kind wins.
    pub fn register(&mut self, handler: Box<dyn ActionHandler>) {
        self.handlers.insert(handler.kind().as_str(), handler);
    }

    /// Dispatch an action and record the execution.
    pub async fn execute(&self, action: &Action, ctx: &ActionContext) -> Result<()> {
        let handler = self.handlers.get(action.kind.as_str()).ok_or_else(|| {
            VerdictError::UnsupportedAction(action.kind.clone())
        })?;

        tracing::info!("⚡ Executing action {} of kind {}", action.id, action.kind);
        handler.run(&action.params, ctx).await?;
        self.record_execution(action, ctx)
    }

    /// Append an immutable execution record to the action's params.
    fn record_execution(&self, action: &Action, ctx: &ActionContext) -> Result<()> {
        let mut updated = action.clone();
        if !updated.params.is_object() {
            updated.params = json!({});
        }

        let record = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "context": ctx.to_json(),
        });

        let executions = updated
            .params
            .as_object_mut()
            .and_then(|obj| {
                obj.entry("executions")
                    .or_insert_with(|| Value::Array(Vec::new()))
                    .as_array_mut()
            });
        match executions {
            Some(list) => list.push(record),
            None => {
                // executions existed but was not an array — do not clobber
                // history-shaped data we do not understand
                return Err(VerdictError::Store(format!(
                    "action {} has a non-array executions field",
                    action.id
                )));
            }
        }

        updated.last_executed_at = Some(Utc::now());
        self.store.save(&updated)
    }
}

// ─── Built-in handlers ──────────────────────────────────────

/// Formats and logs an alert email. Delivery goes through the operator's
/// mail relay in deployment; the pipeline's contract is the template
/// substitution and the execution record.
pub struct EmailAlertHandler;

#[async_trait]
impl ActionHandler for EmailAlertHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::EmailAlert
    }

    async fn run(&self, params: &Value, ctx: &ActionContext) -> Result<()> {
        let recipient = params["recipient"].as_str().unwrap_or("ops@example.com");
        let subject = params["subject"].as_str().unwrap_or("Verdict alert");
        let template = params["template"].as_str().unwrap_or("No template provided");
        let body = ctx.apply_placeholders(template);

        tracing::info!("📧 EMAIL ALERT - To: {recipient}, Subject: {subject}, Body: {body}");
        Ok(())
    }
}

/// Fixed notification message.
pub struct NotifyHandler;

#[async_trait]
impl ActionHandler for NotifyHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::Notify
    }

    async fn run(&self, params: &Value, ctx: &ActionContext) -> Result<()> {
        let message = params["message"].as_str().unwrap_or("Evaluation fired");
        tracing::info!("📢 {} (tree {}, decision {})", message, ctx.tree_id, ctx.decision);
        Ok(())
    }
}

/// Real HTTP call to an external endpoint.
pub struct ApiCallHandler {
    client: reqwest::Client,
}

impl ApiCallHandler {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for ApiCallHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ActionHandler for ApiCallHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::ApiCall
    }

    async fn run(&self, params: &Value, ctx: &ActionContext) -> Result<()> {
        let url = params["url"]
            .as_str()
            .ok_or_else(|| VerdictError::InvalidRequest("API_CALL action has no url".into()))?;
        let method = params["method"].as_str().unwrap_or("POST").to_uppercase();

        let mut req = match method.as_str() {
            "POST" => self.client.post(url),
            "PUT" => self.client.put(url),
            "DELETE" => self.client.delete(url),
            _ => self.client.get(url),
        };

        let payload = if params["payload"].is_null() {
            ctx.to_json()
        } else {
            params["payload"].clone()
        };
        if method != "GET" {
            req = req.json(&payload);
        }

        let resp = req
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| VerdictError::Http(format!("API call to {url} failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(VerdictError::Http(format!(
                "API call to {url} returned {}",
                resp.status()
            )));
        }
        tracing::info!("🌐 API call fired: {method} {url} ({})", resp.status());
        Ok(())
    }
}

/// Sends the current tree back through the reasoner with a refinement
/// prompt and saves the returned nodes.
pub struct RefineTreeHandler {
    pub reasoner: Arc<dyn Reasoner>,
    pub trees: Arc<dyn TreeStore>,
}

#[async_trait]
impl ActionHandler for RefineTreeHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::RefineTree
    }

    async fn run(&self, params: &Value, ctx: &ActionContext) -> Result<()> {
        let tree_id = params["tree_id"].as_str().unwrap_or(&ctx.tree_id);
        let nodes = self.trees.find_by_tree_id(tree_id)?;
        if nodes.is_empty() {
            return Err(VerdictError::TreeNotFound(tree_id.to_string()));
        }
        let tree_json = serde_json::to_string(&nodes)
            .map_err(|e| VerdictError::InvalidTree(format!("serialize tree: {e}")))?;

        let refinement = params["prompt"]
            .as_str()
            .unwrap_or("Tighten the weakest criteria based on the latest evaluation.");

        let system = "You are an expert at refining decision trees in JSON format.\n\
            Improve the provided tree: close logical gaps, sharpen node criteria, \
            and keep every nodeId and treeId unchanged.\n\
            Return ONLY the JSON array of nodes, with no explanations.";
        let user = format!(
            "Here is the current tree to refine:\n{tree_json}\n\nRefinement requirement:\n{refinement}\n\nLatest evaluation rationale:\n{}",
            ctx.rationale
        );

        let response = self.reasoner.complete(system, &user).await?;
        let cleaned = clean_json_response(&response);
        let refined: Vec<TreeNode> = serde_json::from_str(&cleaned).map_err(|e| {
            VerdictError::Provider(format!("Refined tree is not valid node JSON: {e}"))
        })?;
        if refined.is_empty() {
            return Err(VerdictError::Provider("Refined tree has no nodes".into()));
        }

        self.trees.save_nodes(&refined)?;
        tracing::info!("🌱 Refined tree {tree_id}: {} nodes saved", refined.len());
        Ok(())
    }
}

/// Strip markdown fences and anything outside the outermost JSON array.
fn clean_json_response(response: &str) -> String {
    let stripped = response.replace("```json", "").replace("```", "");
    let trimmed = stripped.trim();
    match (trimmed.find('['), trimmed.rfind(']')) {
        (Some(start), Some(end)) if end > start => trimmed[start..=end].to_string(),
        _ => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_json_response() {
        let fenced = "```json\n[{\"nodeId\":\"n1\"}]\n```";
        assert_eq!(clean_json_response(fenced), "[{\"nodeId\":\"n1\"}]");

        let chatty = "Here is the tree:\n[{\"nodeId\":\"n1\"}]\nHope that helps!";
        assert_eq!(clean_json_response(chatty), "[{\"nodeId\":\"n1\"}]");
    }

    #[test]
    fn test_placeholder_substitution() {
        let ctx = ActionContext {
            tree_id: "t1".into(),
            schedule_id: "s1".into(),
            decision: true,
            rationale: "strong trend".into(),
        };
        let body = ctx.apply_placeholders("Tree {tree_id} fired ({decision}): {rationale}");
        assert_eq!(body, "Tree t1 fired (true): strong trend");
    }

    #[test]
    fn test_kind_tags() {
        assert_eq!(ActionKind::EmailAlert.as_str(), "EMAIL_ALERT");
        assert_eq!(ActionKind::RefineTree.as_str(), "REFINE_TREE");
    }
}
