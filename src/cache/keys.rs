//! Cache key builders
//!
//! Every key is `{domain}:{qualifier}`. Each domain has a matching glob in
//! [`patterns`] so writes can purge the whole family; keep the two in step.

/// Single product
pub fn product(product_id: &str) -> String {
    format!("product:{}", product_id)
}

/// Product list or search result, qualified by its filter
pub fn products_list(qualifier: &str) -> String {
    format!("products:list:{}", qualifier)
}

/// User profile
pub fn user_profile(user_id: &str) -> String {
    format!("user_profile:{}", user_id)
}

/// Pointer from a user to their active session id
pub fn user_session(user_id: &str) -> String {
    format!("user_session:{}", user_id)
}

/// Session document
pub fn session(session_id: &str) -> String {
    format!("session:{}", session_id)
}

/// Blacklist marker for a token digest
pub fn blacklist(token_digest: &str) -> String {
    format!("blacklist:{}", token_digest)
}

/// Bare rate-limit counter used by `CacheService::check_rate_limit`
pub fn rate_limit(key: &str) -> String {
    format!("rate_limit:{}", key)
}

/// Rate-limit window counter for an identifier and action
pub fn rate_limit_window(identifier: &str, action: &str) -> String {
    format!("rate_limit:{}:{}", identifier, action)
}

/// Quiz question, with or without its options
pub fn quiz_question(question_id: &str, include_options: bool) -> String {
    format!("quiz_question:{}:{}", question_id, include_options)
}

/// Quiz topic
pub fn quiz_topic(topic_id: &str) -> String {
    format!("quiz_topic:{}", topic_id)
}

/// Aggregate quiz statistics for one topic, or overall with `None`
pub fn quiz_stats(topic_id: Option<&str>) -> String {
    match topic_id {
        Some(id) => format!("quiz_stats:topic:{}", id),
        None => "quiz_stats:overall".to_string(),
    }
}

/// Daily quiz leaderboard
pub fn daily_leaderboard(date: &str) -> String {
    format!("daily_score:leaderboard:date:{}", date)
}

/// Invalidation globs per key family
pub mod patterns {
    pub const PRODUCT: &str = "product:*";
    pub const PRODUCTS: &str = "products:*";
    pub const PRODUCTS_LIST: &str = "products:list:*";
    pub const USER_PROFILE: &str = "user_profile:*";
    pub const USER_SESSION: &str = "user_session:*";
    pub const SESSION: &str = "session:*";
    pub const BLACKLIST: &str = "blacklist:*";
    pub const RATE_LIMIT: &str = "rate_limit:*";
    pub const QUIZ_QUESTION: &str = "quiz_question:*";
    pub const QUIZ_TOPIC: &str = "quiz_topic:*";
    pub const QUIZ_STATS: &str = "quiz_stats:*";
    pub const DAILY_SCORE: &str = "daily_score:*";
    pub const ORDER: &str = "order*";

    /// Everything a product write can stale
    pub const PRODUCT_WRITE: &[&str] = &[PRODUCT, PRODUCTS];

    /// Everything a quiz content write can stale
    pub const QUIZ_WRITE: &[&str] = &[QUIZ_QUESTION, QUIZ_TOPIC, QUIZ_STATS];

    /// Key families reported by the cache stats endpoint
    pub const FAMILIES: &[(&str, &str)] = &[
        ("products", "product*"),
        ("users", "user*"),
        ("sessions", SESSION),
        ("rate_limits", RATE_LIMIT),
        ("quiz", "quiz_*"),
        ("orders", ORDER),
    ];

    /// Key families the admin endpoint can clear, with the globs each covers
    pub const CLEARABLE: &[(&str, &[&str])] = &[
        ("products", PRODUCT_WRITE),
        ("users", &[USER_PROFILE, USER_SESSION]),
        ("sessions", &[USER_SESSION, SESSION]),
        ("rate_limits", &[RATE_LIMIT]),
        ("quiz", QUIZ_WRITE),
        ("orders", &[ORDER]),
        ("all", &["*"]),
    ];

    /// Globs cleared for a named family
    pub fn clearable(family: &str) -> Option<&'static [&'static str]> {
        CLEARABLE
            .iter()
            .find(|(name, _)| *name == family)
            .map(|(_, globs)| *globs)
    }
}
