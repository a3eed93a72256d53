//! Configured agents and their delegation graph.
//!
//! Agents live in an [`AgentSet`] and refer to their subordinates by
//! [`AgentId`], so a workflow can borrow one agent at a time while recursing
//! through delegations, including an agent delegating to itself.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{Context, Result, anyhow};

use crate::io::config::AgentDefinition;
use crate::io::prompt::{Capability, SystemPromptInput, render_system_prompt};
use crate::io::tools::ToolRegistry;

pub mod agent;

pub use agent::Agent;

/// Handle of an agent inside the [`AgentSet`] that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AgentId(usize);

#[derive(Debug, Default)]
pub struct AgentSet {
    agents: Vec<Agent>,
    by_name: HashMap<String, AgentId>,
}

impl AgentSet {
    /// Build every agent, its tool registry (rooted at `cwd`) and system prompt.
    pub fn from_definitions(definitions: &[AgentDefinition], cwd: &Path) -> Result<Self> {
        let mut by_name = HashMap::new();
        for (index, def) in definitions.iter().enumerate() {
            if by_name.insert(def.name.clone(), AgentId(index)).is_some() {
                return Err(anyhow!("duplicate agent name '{}'", def.name));
            }
        }

        let mut agents = Vec::with_capacity(definitions.len());
        for def in definitions {
            let tools = ToolRegistry::from_names(def.tools.as_slice(), cwd)
                .with_context(|| format!("tools for agent '{}'", def.name))?;

            let mut subordinates = BTreeMap::new();
            let mut agent_caps = Vec::new();
            for sub in &def.subordinates {
                let id = *by_name
                    .get(sub)
                    .ok_or_else(|| anyhow!("agent '{}' lists unknown subordinate '{sub}'", def.name))?;
                subordinates.insert(sub.clone(), id);
                agent_caps.push(Capability::new(sub, &definitions[id.0].description));
            }

            let system_prompt = render_system_prompt(&SystemPromptInput {
                name: def.name.clone(),
                instructions: def.instructions.clone(),
                tools: tools
                    .descriptions()
                    .into_iter()
                    .map(|(name, description)| Capability::new(name, description))
                    .collect(),
                agents: agent_caps,
            })
            .with_context(|| format!("render system prompt for '{}'", def.name))?;

            agents.push(Agent::new(
                def.name.clone(),
                def.description.clone(),
                def.model.clone(),
                system_prompt,
                tools,
                subordinates,
            ));
        }

        Ok(Self { agents, by_name })
    }

    pub fn id(&self, name: &str) -> Option<AgentId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: AgentId) -> &Agent {
        &self.agents[id.0]
    }

    pub fn get_mut(&mut self, id: AgentId) -> &mut Agent {
        &mut self.agents[id.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Agent> {
        self.agents.iter()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::AppConfig;

    #[test]
    fn default_agents_link_by_name() {
        let cfg = AppConfig::default();
        let set = AgentSet::from_definitions(&cfg.agents, Path::new(".")).expect("agents");

        let analyzer = set.id("DirectoryAnalyzer").expect("analyzer");
        let reader = set.id("text_analyzer").expect("reader");
        assert_eq!(set.get(analyzer).subordinate("text_analyzer"), Some(reader));
        assert_eq!(set.get(reader).subordinate("DirectoryAnalyzer"), None);
        assert!(set.get(analyzer).system_prompt().contains("- text_analyzer:"));
        assert!(set.get(analyzer).system_prompt().contains("- ls:"));
        assert!(!set.get(analyzer).system_prompt().contains("- read_file:"));
    }

    #[test]
    fn self_delegation_resolves_to_same_id() {
        let def = AgentDefinition {
            name: "loop".to_string(),
            description: "Delegates to itself".to_string(),
            instructions: "Keep going.".to_string(),
            model: "tiny".to_string(),
            tools: Vec::new(),
            subordinates: vec!["loop".to_string()],
        };
        let set = AgentSet::from_definitions(&[def], Path::new(".")).expect("agents");
        let id = set.id("loop").expect("id");
        assert_eq!(set.get(id).subordinate("loop"), Some(id));
    }

    #[test]
    fn unknown_subordinate_fails() {
        let mut cfg = AppConfig::default();
        cfg.agents[0].subordinates.push("ghost".to_string());
        let err = AgentSet::from_definitions(&cfg.agents, Path::new(".")).unwrap_err();
        assert!(format!("{err:#}").contains("ghost"));
    }
}
