use serde::Serialize;
use serde_json::Value;
use similar::TextDiff;

/// One drift finding: what is wrong, how to fix it, and optionally the exact
/// SQL that fixes it.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    name: String,
    problem: String,
    solution: String,
    diff: Option<(Value, Value)>,
    statements: Option<Vec<String>>,
    url_hint: Option<String>,
}

impl Summary {
    pub fn new(
        name: impl Into<String>,
        problem: impl Into<String>,
        solution: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            problem: problem.into(),
            solution: solution.into(),
            diff: None,
            statements: None,
            url_hint: None,
        }
    }

    /// Attach the expected and actual values for textual diffing.
    pub fn with_diff<A: Serialize + ?Sized, B: Serialize + ?Sized>(
        mut self,
        expected: &A,
        actual: &B,
    ) -> Self {
        self.diff = Some((
            serde_json::to_value(expected).unwrap_or_default(),
            serde_json::to_value(actual).unwrap_or_default(),
        ));
        self
    }

    pub fn with_statements<I, S>(mut self, statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.statements = Some(statements.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_url_hint(mut self, url: impl Into<String>) -> Self {
        self.url_hint = Some(url.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn problem(&self) -> &str {
        &self.problem
    }

    pub fn solution(&self) -> &str {
        &self.solution
    }

    /// `(expected, actual)` when a structural diff was attached.
    pub fn diff(&self) -> Option<(&Value, &Value)> {
        self.diff.as_ref().map(|(a, b)| (a, b))
    }

    /// Corrective SQL in execution order.
    pub fn statements(&self) -> Option<&[String]> {
        self.statements.as_deref()
    }

    pub fn url_hint(&self) -> Option<&str> {
        self.url_hint.as_deref()
    }

    /// Unified line diff from the expected value to the actual value.
    pub fn render_diff(&self) -> Option<String> {
        let (expected, actual) = self.diff()?;
        let expected = render_value(expected);
        let actual = render_value(actual);

        Some(
            TextDiff::from_lines(&expected, &actual)
                .unified_diff()
                .header("expected", "actual")
                .to_string(),
        )
    }
}

fn render_value(value: &Value) -> String {
    let mut rendered = match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_default(),
    };
    if !rendered.ends_with('\n') {
        rendered.push('\n');
    }
    rendered
}
