//! Built-in prompt definitions shipped with the binary.

pub const ROUTE: &str = "rag.route";
pub const GRADE_DOCUMENT: &str = "rag.grade_document";
pub const GRADE_GROUNDEDNESS: &str = "rag.grade_groundedness";
pub const GRADE_USEFULNESS: &str = "rag.grade_usefulness";
pub const REWRITE: &str = "rag.rewrite";
pub const GENERATE: &str = "rag.generate";
pub const THREAD_TITLE: &str = "rag.thread_title";

const BUILTINS: &[(&str, &str)] = &[
    (ROUTE, include_str!("../prompts/rag.route.yml")),
    (GRADE_DOCUMENT, include_str!("../prompts/rag.grade_document.yml")),
    (
        GRADE_GROUNDEDNESS,
        include_str!("../prompts/rag.grade_groundedness.yml"),
    ),
    (
        GRADE_USEFULNESS,
        include_str!("../prompts/rag.grade_usefulness.yml"),
    ),
    (REWRITE, include_str!("../prompts/rag.rewrite.yml")),
    (GENERATE, include_str!("../prompts/rag.generate.yml")),
    (THREAD_TITLE, include_str!("../prompts/rag.thread_title.yml")),
];

/// Raw YAML of a built-in prompt.
pub fn builtin_source(prompt_id: &str) -> Option<&'static str> {
    BUILTINS
        .iter()
        .find(|(id, _)| *id == prompt_id)
        .map(|(_, yaml)| *yaml)
}

/// IDs of all built-in prompts.
pub fn builtin_prompt_ids() -> Vec<&'static str> {
    BUILTINS.iter().map(|(id, _)| *id).collect()
}
