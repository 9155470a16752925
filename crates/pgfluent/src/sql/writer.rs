use crate::ident::Ident;
use crate::value::{Binder, Value};

#[derive(Debug)]
enum SqlPart {
    Raw(String),
    Param,
}

/// Accumulates SQL text and binders, numbering placeholders `$1, $2, ...` on finish.
#[derive(Debug, Default)]
pub(crate) struct SqlWriter {
    parts: Vec<SqlPart>,
    binders: Vec<Binder>,
}

impl SqlWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append raw SQL.
    pub(crate) fn push(&mut self, sql: &str) {
        if sql.is_empty() {
            return;
        }
        match self.parts.last_mut() {
            Some(SqlPart::Raw(last)) => last.push_str(sql),
            _ => self.parts.push(SqlPart::Raw(sql.to_string())),
        }
    }

    /// Append a placeholder bound to `value`.
    pub(crate) fn push_bind(&mut self, value: Value) {
        self.parts.push(SqlPart::Param);
        self.binders.push(Binder::new(value));
    }

    pub(crate) fn push_ident(&mut self, ident: &Ident, force_quotes: bool) {
        match self.parts.last_mut() {
            Some(SqlPart::Raw(last)) => ident.write_sql(last, force_quotes),
            _ => {
                let mut s = String::new();
                ident.write_sql(&mut s, force_quotes);
                self.parts.push(SqlPart::Raw(s));
            }
        }
    }

    /// Render the text and hand back the binders in placeholder order.
    pub(crate) fn finish(self) -> (String, Vec<Binder>) {
        #[inline]
        fn push_usize(out: &mut String, mut n: usize) {
            if n < 10 {
                out.push((b'0' + n as u8) as char);
                return;
            }
            let mut buf = [0u8; 20];
            let mut pos = buf.len();
            while n > 0 {
                pos -= 1;
                buf[pos] = b'0' + (n % 10) as u8;
                n /= 10;
            }
            for &digit in &buf[pos..] {
                out.push(digit as char);
            }
        }

        let cap: usize = self
            .parts
            .iter()
            .map(|part| match part {
                SqlPart::Raw(s) => s.len(),
                SqlPart::Param => 4,
            })
            .sum();

        let mut out = String::with_capacity(cap);
        let mut idx = 0;
        for part in &self.parts {
            match part {
                SqlPart::Raw(s) => out.push_str(s),
                SqlPart::Param => {
                    idx += 1;
                    out.push('$');
                    push_usize(&mut out, idx);
                }
            }
        }
        (out, self.binders)
    }
}
