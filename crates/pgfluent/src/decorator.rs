//! SQL text decorators applied once to a composed SELECT.

/// Post-processes the composed SQL text.
pub trait SqlDecorator: Send + Sync {
    fn decorate(&self, sql: String) -> String;
}

impl<F> SqlDecorator for F
where
    F: Fn(String) -> String + Send + Sync,
{
    fn decorate(&self, sql: String) -> String {
        self(sql)
    }
}

/// Row-lock wait policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockWait {
    #[default]
    Wait,
    NoWait,
    SkipLocked,
}

impl LockWait {
    fn suffix(self) -> &'static str {
        match self {
            LockWait::Wait => "",
            LockWait::NoWait => " NOWAIT",
            LockWait::SkipLocked => " SKIP LOCKED",
        }
    }
}

/// Appends `FOR UPDATE`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForUpdate {
    pub wait: LockWait,
}

impl ForUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nowait(mut self) -> Self {
        self.wait = LockWait::NoWait;
        self
    }

    pub fn skip_locked(mut self) -> Self {
        self.wait = LockWait::SkipLocked;
        self
    }
}

impl SqlDecorator for ForUpdate {
    fn decorate(&self, mut sql: String) -> String {
        sql.push_str(" FOR UPDATE");
        sql.push_str(self.wait.suffix());
        sql
    }
}

/// Appends `FOR SHARE`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForShare {
    pub wait: LockWait,
}

impl ForShare {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nowait(mut self) -> Self {
        self.wait = LockWait::NoWait;
        self
    }

    pub fn skip_locked(mut self) -> Self {
        self.wait = LockWait::SkipLocked;
        self
    }
}

impl SqlDecorator for ForShare {
    fn decorate(&self, mut sql: String) -> String {
        sql.push_str(" FOR SHARE");
        sql.push_str(self.wait.suffix());
        sql
    }
}

/// Prefixes a `/* comment */`, for tagging statements in server logs.
#[derive(Debug, Clone)]
pub struct SqlComment(String);

impl SqlComment {
    /// `*/` inside the text is neutralized so the comment cannot be closed early.
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into().replace("*/", "* /"))
    }
}

impl SqlDecorator for SqlComment {
    fn decorate(&self, sql: String) -> String {
        format!("/* {} */ {sql}", self.0)
    }
}
