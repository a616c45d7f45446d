//! Keyword list and classification definition for agent-repository mining.

/// Case-insensitive substrings; any hit in name, description or README passes.
pub const AGENT_KEYWORDS: &[&str] = &[
    "agent",
    "llm",
    "langchain",
    "autogen",
    "openai",
    "chatgpt",
    "gpt",
    "claude",
    "anthropic",
    "assistant",
    "chatbot",
    "ai assistant",
    "autonomous",
    "tool calling",
    "function calling",
    "prompt",
    "memory store",
    "vector store",
    "embedding",
    "rag",
    "retrieval",
    "planner",
    "orchestration",
    "multi-agent",
    "workflow",
];

pub const AGENT_REPO_DEFINITION: &str = r#"## Agent Repository Definition

An Agent Repository is a codebase that implements or contains an LLM-based agent system.

Core characteristics:
1. An LLM-controlled "brain": task decomposition and scheduling (planning), and
   storage/retrieval of past actions or conversation (memory).
2. Perception: receives and processes input from the environment (user input,
   events, files, sensors).
3. Action/tooling: executes actions by invoking external tools or APIs (search,
   shell, databases, third-party services, plugins).
4. Single- or multi-agent orchestration.
5. Integration with one or more LLM providers (SDKs, API keys, model settings).

Judgment criteria (3+ = likely, 5+ = highly likely):
1. README or code mentions "agent", "planner", "tool invocation", "memory" or "LLM".
2. Code depends on an LLM provider SDK.
3. Contains prompt/template directories or prompt management code.
4. Implements memory storage (vector database, session store, memory module).
5. Wraps or calls external tools/plugins.
6. Contains an agent loop or orchestration (planner/scheduler).
"#;

pub const AGENT_ISSUE_DEFINITION: &str = r#"## Agent Issue Definition

An Agent Issue is an issue in an agent codebase whose root cause or fix lies in
the agent machinery rather than in generic application code.

It typically concerns one or more of:
1. LLM invocation: prompts, model parameters, provider SDK calls, response parsing.
2. Tool use: tool/function-calling schemas, tool dispatch, tool result handling.
3. Memory: conversation history, vector stores, retrieval and context assembly.
4. Planning and control flow: agent loops, task decomposition, termination.
5. Multi-agent coordination: message passing, role assignment, orchestration.

Issues about packaging, documentation, CI, or unrelated UI code are not Agent Issues.
"#;

/// Lowercased keyword matcher. Matching is plain substring search.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    keywords: Vec<String>,
}

impl KeywordMatcher {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// First keyword found in `text`, if any.
    pub fn first_match(&self, text: &str) -> Option<&str> {
        let haystack = text.to_lowercase();
        self.keywords
            .iter()
            .find(|k| haystack.contains(k.as_str()))
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }
}

impl Default for KeywordMatcher {
    fn default() -> Self {
        Self::new(AGENT_KEYWORDS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_filter_cases() {
        let m = KeywordMatcher::default();
        let cases = [
            ("langchain-ai/langchain LangChain framework", true),
            ("microsoft/autogen Multi-agent framework", true),
            ("openai/openai-python OpenAI Python SDK", true),
            ("facebook/react JavaScript library", false),
            ("torvalds/linux Linux kernel", false),
        ];
        for (text, expected) in cases {
            assert_eq!(m.first_match(text).is_some(), expected, "{text}");
        }
    }

    #[test]
    fn test_match_is_case_insensitive() {
        let m = KeywordMatcher::new(["Tool Calling"]);
        assert_eq!(m.first_match("Adds TOOL CALLING support"), Some("tool calling"));
    }

    #[test]
    fn test_blank_keywords_are_dropped() {
        let m = KeywordMatcher::new(["", "  "]);
        assert!(m.is_empty());
        assert_eq!(m.first_match("anything"), None);
    }
}
