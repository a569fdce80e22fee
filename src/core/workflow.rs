//! Workflow 圖的宣告、連線檢查與靜態執行順序
//!
//! A [`Workflow`] owns nodes and nested workflows in insertion order, plus
//! the connections between them. Nothing here runs the tools; the graph is
//! checked with [`Workflow::validate`] and handed to an engine as a plan of
//! fully qualified node names.

use crate::app::functions::{check_ref_num, nonb0_indices, xfm_jacobian_files};
use crate::domain::model::FieldValue;
use crate::domain::ports::Interface;
use crate::utils::error::{PrepError, Result};
use crate::utils::text_io::load_vector;
use crate::utils::validation::validate_identifier;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fmt::Write as _;

/// 圖上的一個節點；設定了 `iterfield` 的節點會對那些輸入逐一執行
#[derive(Debug)]
pub struct Node {
    name: String,
    interface: Box<dyn Interface>,
    iterfield: Vec<String>,
}

impl Node {
    pub fn new(name: &str, interface: impl Interface + 'static) -> Self {
        Self {
            name: name.to_string(),
            interface: Box::new(interface),
            iterfield: Vec::new(),
        }
    }

    /// MapNode：`iterfield` 中的輸入為串列，逐元素執行
    pub fn map(name: &str, interface: impl Interface + 'static, iterfield: &[&str]) -> Self {
        Self {
            iterfield: iterfield.iter().map(|f| f.to_string()).collect(),
            ..Self::new(name, interface)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interface(&self) -> &dyn Interface {
        self.interface.as_ref()
    }

    pub fn interface_mut(&mut self) -> &mut dyn Interface {
        self.interface.as_mut()
    }

    pub fn iterfield(&self) -> &[String] {
        &self.iterfield
    }

    pub fn is_map_node(&self) -> bool {
        !self.iterfield.is_empty()
    }
}

/// 連線上對值做的轉換
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Connector {
    /// 未定義的參考索引改為 0
    #[serde(rename = "_checkrnum")]
    CheckRefNum,
    /// b-value 檔 → non-b0 索引
    #[serde(rename = "_nonb0")]
    NonB0,
    /// 矩陣檔 → |det|
    #[serde(rename = "_xfm_jacobian")]
    XfmJacobian,
}

impl Connector {
    pub fn name(&self) -> &'static str {
        match self {
            Connector::CheckRefNum => "_checkrnum",
            Connector::NonB0 => "_nonb0",
            Connector::XfmJacobian => "_xfm_jacobian",
        }
    }

    pub fn apply(&self, value: &FieldValue) -> Result<FieldValue> {
        match self {
            Connector::CheckRefNum => {
                let ref_num = match value {
                    FieldValue::Undefined => None,
                    other => Some(other.as_int().and_then(|i| usize::try_from(i).ok()).ok_or_else(
                        || PrepError::ProcessingError {
                            message: format!("reference index must be a non-negative integer, got {}", other),
                        },
                    )?),
                };
                Ok(FieldValue::from(check_ref_num(ref_num)))
            }
            Connector::NonB0 => {
                let path = value.as_path().ok_or_else(|| PrepError::ProcessingError {
                    message: format!("expected a b-value file, got {}", value),
                })?;
                let bvals = load_vector(path)?;
                Ok(FieldValue::from(nonb0_indices(&bvals)))
            }
            Connector::XfmJacobian => {
                let paths = value.to_paths().ok_or_else(|| PrepError::ProcessingError {
                    message: format!("expected matrix files, got {}", value),
                })?;
                Ok(FieldValue::from(xfm_jacobian_files(&paths)?))
            }
        }
    }
}

impl fmt::Display for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 一條連線；巢狀 workflow 上的欄位寫成 `inner_node.field`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Connection {
    pub source: String,
    pub source_field: String,
    pub dest: String,
    pub dest_field: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connector: Option<Connector>,
}

#[derive(Debug)]
enum Member {
    Node(Node),
    Workflow(Workflow),
}

impl Member {
    fn name(&self) -> &str {
        match self {
            Member::Node(node) => &node.name,
            Member::Workflow(workflow) => &workflow.name,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Source,
    Dest,
}

#[derive(Debug)]
pub struct Workflow {
    name: String,
    members: Vec<Member>,
    connections: Vec<Connection>,
}

/// 展開巢狀 workflow 後的節點與連線
struct FlatGraph<'a> {
    nodes: Vec<(String, &'a Node)>,
    edges: Vec<Connection>,
}

impl Workflow {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            members: Vec::new(),
            connections: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_node(&mut self, node: Node) {
        tracing::debug!("➕ {}: node {} ({})", self.name, node.name, node.interface.name());
        self.members.push(Member::Node(node));
    }

    pub fn add_workflow(&mut self, workflow: Workflow) {
        tracing::debug!("➕ {}: nested workflow {}", self.name, workflow.name);
        self.members.push(Member::Workflow(workflow));
    }

    /// 多組欄位連線，與 nipype 的 `connect(src, dst, [(a, b)])` 相同
    pub fn connect(&mut self, source: &str, dest: &str, fields: &[(&str, &str)]) {
        for (source_field, dest_field) in fields {
            self.connections.push(Connection {
                source: source.to_string(),
                source_field: source_field.to_string(),
                dest: dest.to_string(),
                dest_field: dest_field.to_string(),
                connector: None,
            });
        }
    }

    /// 帶有轉換函式的單一連線
    pub fn connect_with(&mut self, source: &str, source_field: &str, connector: Connector, dest: &str, dest_field: &str) {
        self.connections.push(Connection {
            source: source.to_string(),
            source_field: source_field.to_string(),
            dest: dest.to_string(),
            dest_field: dest_field.to_string(),
            connector: Some(connector),
        });
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    fn member(&self, name: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.name() == name)
    }

    fn member_mut(&mut self, name: &str) -> Option<&mut Member> {
        self.members.iter_mut().find(|m| m.name() == name)
    }

    /// 依相對路徑（`node` 或 `inner.node`）找節點
    pub fn node(&self, path: &str) -> Option<&Node> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        match (self.member(head)?, rest) {
            (Member::Node(node), None) => Some(node),
            (Member::Workflow(workflow), Some(rest)) => workflow.node(rest),
            _ => None,
        }
    }

    /// 設定 `node.field`（巢狀時為 `inner.node.field`）的值
    pub fn set_input(&mut self, path: &str, value: impl Into<FieldValue>) -> Result<()> {
        let value = value.into();
        let (head, rest) = path.split_once('.').ok_or_else(|| {
            PrepError::workflow(&self.name, format!("'{}' is not of the form node.field", path))
        })?;
        let workflow_name = self.name.clone();
        match self.member_mut(head) {
            Some(Member::Node(node)) => node.interface.set_input(rest, value),
            Some(Member::Workflow(workflow)) => workflow.set_input(rest, value),
            None => Err(PrepError::workflow(&workflow_name, format!("unknown node '{}'", head))),
        }
    }

    /// 將一端點解析為完整節點名稱與欄位
    fn resolve(&self, prefix: &str, member: &str, field: &str, side: Side) -> Result<(String, String)> {
        match self.member(member) {
            None => Err(PrepError::workflow(&self.name, format!("unknown node '{}'", member))),
            Some(Member::Node(node)) => {
                let spec = match side {
                    Side::Source => node.interface.output_spec(),
                    Side::Dest => node.interface.input_spec(),
                };
                if !spec.contains(field) {
                    let kind = match side {
                        Side::Source => "output",
                        Side::Dest => "input",
                    };
                    return Err(PrepError::workflow(
                        &self.name,
                        format!("{} ({}) has no {} '{}'", node.name, node.interface.name(), kind, field),
                    ));
                }
                Ok((format!("{}.{}", prefix, node.name), field.to_string()))
            }
            Some(Member::Workflow(workflow)) => {
                let (inner, rest) = field.split_once('.').ok_or_else(|| {
                    PrepError::workflow(
                        &self.name,
                        format!("field '{}' on nested workflow '{}' must be node.field", field, workflow.name),
                    )
                })?;
                workflow.resolve(&format!("{}.{}", prefix, workflow.name), inner, rest, side)
            }
        }
    }

    fn flatten_into<'a>(&'a self, prefix: &str, graph: &mut FlatGraph<'a>) -> Result<()> {
        for member in &self.members {
            match member {
                Member::Node(node) => graph.nodes.push((format!("{}.{}", prefix, node.name), node)),
                Member::Workflow(workflow) => {
                    workflow.flatten_into(&format!("{}.{}", prefix, workflow.name), graph)?
                }
            }
        }

        for conn in &self.connections {
            let (source, source_field) = self.resolve(prefix, &conn.source, &conn.source_field, Side::Source)?;
            let (dest, dest_field) = self.resolve(prefix, &conn.dest, &conn.dest_field, Side::Dest)?;
            graph.edges.push(Connection {
                source,
                source_field,
                dest,
                dest_field,
                connector: conn.connector,
            });
        }
        Ok(())
    }

    fn flatten(&self) -> Result<FlatGraph<'_>> {
        let mut graph = FlatGraph {
            nodes: Vec::new(),
            edges: Vec::new(),
        };
        self.flatten_into(&self.name, &mut graph)?;
        Ok(graph)
    }

    fn check_members(&self) -> Result<()> {
        validate_identifier("workflow name", &self.name)?;

        let mut seen = HashSet::new();
        for member in &self.members {
            validate_identifier("node name", member.name())?;
            if !seen.insert(member.name()) {
                return Err(PrepError::workflow(
                    &self.name,
                    format!("duplicate node name '{}'", member.name()),
                ));
            }

            match member {
                Member::Node(node) => {
                    for field in &node.iterfield {
                        if !node.interface.input_spec().contains(field) {
                            return Err(PrepError::workflow(
                                &self.name,
                                format!("iterfield '{}' is not an input of {}", field, node.name),
                            ));
                        }
                    }
                    node.interface.check_declaration().map_err(|e| {
                        PrepError::workflow(&self.name, format!("node {}: {}", node.name, e))
                    })?;
                }
                Member::Workflow(workflow) => workflow.check_members()?,
            }
        }
        Ok(())
    }

    fn has_circular_dependency(
        node: &str,
        adjacency: &HashMap<&str, Vec<&str>>,
        visited: &mut HashSet<String>,
        rec_stack: &mut HashSet<String>,
    ) -> bool {
        visited.insert(node.to_string());
        rec_stack.insert(node.to_string());

        if let Some(next) = adjacency.get(node) {
            for dep in next {
                if !visited.contains(*dep) {
                    if Self::has_circular_dependency(dep, adjacency, visited, rec_stack) {
                        return true;
                    }
                } else if rec_stack.contains(*dep) {
                    return true;
                }
            }
        }

        rec_stack.remove(node);
        false
    }

    /// 檢查整張圖的連線
    pub fn validate(&self) -> Result<()> {
        self.check_members()?;
        let graph = self.flatten()?;

        let mut connected = HashSet::new();
        for edge in &graph.edges {
            if !connected.insert((edge.dest.as_str(), edge.dest_field.as_str())) {
                return Err(PrepError::workflow(
                    &self.name,
                    format!("input {}.{} is connected more than once", edge.dest, edge.dest_field),
                ));
            }
        }

        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in &graph.edges {
            adjacency.entry(edge.source.as_str()).or_default().push(edge.dest.as_str());
        }
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        for (name, _) in &graph.nodes {
            if !visited.contains(name)
                && Self::has_circular_dependency(name, &adjacency, &mut visited, &mut rec_stack)
            {
                return Err(PrepError::workflow(
                    &self.name,
                    format!("circular dependency detected through {}", name),
                ));
            }
        }

        for (name, node) in &graph.nodes {
            let tool = match node.interface.as_command() {
                Some(tool) => tool,
                None => continue,
            };
            for (field, spec) in tool.input_spec().traits() {
                if spec.is_mandatory()
                    && !spec.is_genfile()
                    && tool.input(field).is_none()
                    && !connected.contains(&(name.as_str(), field))
                {
                    return Err(PrepError::MissingInput {
                        interface: name.clone(),
                        field: field.to_string(),
                    });
                }
            }
        }

        tracing::debug!(
            "✅ Workflow {} is valid ({} nodes, {} connections)",
            self.name,
            graph.nodes.len(),
            graph.edges.len()
        );
        Ok(())
    }

    /// 拓撲排序後的完整節點名稱；同層依加入順序
    pub fn execution_plan(&self) -> Result<Vec<String>> {
        self.validate()?;
        let graph = self.flatten()?;

        let mut indegree: HashMap<&str, usize> = graph.nodes.iter().map(|(n, _)| (n.as_str(), 0)).collect();
        let mut upstream: HashSet<(&str, &str)> = HashSet::new();
        for edge in &graph.edges {
            if upstream.insert((edge.source.as_str(), edge.dest.as_str())) {
                *indegree.entry(edge.dest.as_str()).or_default() += 1;
            }
        }

        let mut plan: Vec<String> = Vec::with_capacity(graph.nodes.len());
        let mut done: HashSet<&str> = HashSet::new();
        while plan.len() < graph.nodes.len() {
            let next = graph
                .nodes
                .iter()
                .map(|(n, _)| n.as_str())
                .find(|n| !done.contains(n) && indegree.get(n).copied().unwrap_or(0) == 0)
                .ok_or_else(|| PrepError::workflow(&self.name, "graph has a cycle"))?;

            done.insert(next);
            plan.push(next.to_string());
            for (source, dest) in &upstream {
                if *source == next {
                    if let Some(count) = indegree.get_mut(dest) {
                        *count -= 1;
                    }
                }
            }
        }
        Ok(plan)
    }

    /// Graphviz 格式
    pub fn to_dot(&self) -> Result<String> {
        let graph = self.flatten()?;
        let mut dot = String::new();
        let _ = writeln!(dot, "digraph \"{}\" {{", self.name);
        for (name, node) in &graph.nodes {
            let shape = if node.is_map_node() { "box3d" } else { "box" };
            let interface = match node.interface.helper_name() {
                Some(helper) => format!("{}: {}", node.interface.name(), helper),
                None => node.interface.name().to_string(),
            };
            let _ = writeln!(
                dot,
                "  \"{}\" [label=\"{}\\n({})\", shape={}];",
                name, node.name, interface, shape
            );
        }
        for edge in &graph.edges {
            let label = match edge.connector {
                Some(connector) => format!("{}->{} [{}]", edge.source_field, edge.dest_field, connector),
                None => format!("{}->{}", edge.source_field, edge.dest_field),
            };
            let _ = writeln!(dot, "  \"{}\" -> \"{}\" [label=\"{}\"];", edge.source, edge.dest, label);
        }
        dot.push_str("}\n");
        Ok(dot)
    }

    /// 可序列化的摘要，給 `describe` 使用
    pub fn summary(&self) -> Result<WorkflowSummary> {
        let plan = self.execution_plan()?;
        let graph = self.flatten()?;

        let nodes = graph
            .nodes
            .iter()
            .map(|(name, node)| NodeSummary {
                name: name.clone(),
                interface: node.interface.name().to_string(),
                helper: node.interface.helper_name().map(str::to_string),
                kind: node.interface.kind(),
                iterfield: node.iterfield.clone(),
                inputs: node
                    .interface
                    .inputs()
                    .iter()
                    .filter(|(_, v)| v.is_defined())
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            })
            .collect();

        Ok(WorkflowSummary {
            name: self.name.clone(),
            generated_at: Utc::now(),
            nodes,
            connections: graph.edges,
            plan,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeSummary {
    pub name: String,
    pub interface: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub helper: Option<String>,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub iterfield: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<(String, FieldValue)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowSummary {
    pub name: String,
    pub generated_at: DateTime<Utc>,
    pub nodes: Vec<NodeSummary>,
    pub connections: Vec<Connection>,
    pub plan: Vec<String>,
}

impl fmt::Display for WorkflowSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Workflow {} ({} nodes)", self.name, self.nodes.len())?;
        for (step, name) in self.plan.iter().enumerate() {
            let node = self.nodes.iter().find(|n| &n.name == name);
            match node {
                Some(node) => {
                    let interface = match &node.helper {
                        Some(helper) => format!("{}: {}", node.interface, helper),
                        None => node.interface.clone(),
                    };
                    if node.iterfield.is_empty() {
                        writeln!(f, "  {:>2}. {} [{}]", step + 1, name, interface)?
                    } else {
                        writeln!(
                            f,
                            "  {:>2}. {} [{}] iterates over {}",
                            step + 1,
                            name,
                            interface,
                            node.iterfield.join(", ")
                        )?
                    }
                }
                None => writeln!(f, "  {:>2}. {}", step + 1, name)?,
            }
        }
        Ok(())
    }
}
