use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Bot,
    App,
}

impl TokenKind {
    fn expected_prefix(self) -> &'static str {
        match self {
            TokenKind::Bot => "xoxb-",
            TokenKind::App => "xapp-",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Bot => f.write_str("SLACK_BOT_TOKEN"),
            TokenKind::App => f.write_str("SLACK_APP_TOKEN"),
        }
    }
}

/// Startup warnings for tokens that do not carry the expected prefix.
pub fn token_warnings(bot_token: &str, app_token: Option<&str>) -> Vec<String> {
    let mut warnings = Vec::new();
    let mut check = |kind: TokenKind, token: &str| {
        if !token.trim().starts_with(kind.expected_prefix()) {
            warnings.push(format!(
                "{kind} should start with '{}'; Slack calls may be rejected",
                kind.expected_prefix()
            ));
        }
    };
    check(TokenKind::Bot, bot_token);
    if let Some(app_token) = app_token {
        check(TokenKind::App, app_token);
    }
    warnings
}
