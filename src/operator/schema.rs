//! Static description of an operator kind.

use crate::batch::Layout;
use crate::error::{EagerError, Result};

/// What every instance of an operator kind accepts and produces.
///
/// # Example
///
/// ```rust
/// use briny_eager::OpSchema;
///
/// let schema = OpSchema::new("Blur")
///     .num_input(1)
///     .num_output(1)
///     .input_layouts(0, &["HWC", "FHWC"]);
/// assert_eq!(schema.input_layout(0, 3).unwrap().unwrap().as_str(), "HWC");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpSchema {
    name: String,
    min_inputs: usize,
    max_inputs: usize,
    num_outputs: usize,
    input_layouts: Vec<Vec<Layout>>,
    argument_inputs: Vec<String>,
}

impl OpSchema {
    /// A schema with one input and one output.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            min_inputs: 1,
            max_inputs: 1,
            num_outputs: 1,
            input_layouts: Vec::new(),
            argument_inputs: Vec::new(),
        }
    }

    /// Exactly `n` inputs.
    #[must_use]
    pub fn num_input(self, n: usize) -> Self {
        self.num_inputs(n, n)
    }

    /// Between `min` and `max` inputs.
    #[must_use]
    pub fn num_inputs(mut self, min: usize, max: usize) -> Self {
        self.min_inputs = min;
        self.max_inputs = max.max(min);
        self
    }

    #[must_use]
    pub const fn num_output(mut self, n: usize) -> Self {
        self.num_outputs = n;
        self
    }

    /// Allowed layouts of input `index`; the first of matching rank is the
    /// default for untagged inputs.
    #[must_use]
    pub fn input_layouts(mut self, index: usize, layouts: &[&str]) -> Self {
        if self.input_layouts.len() <= index {
            self.input_layouts.resize(index + 1, Vec::new());
        }
        self.input_layouts[index] = layouts.iter().map(|l| Layout::new(l)).collect();
        self
    }

    /// Declares a named per-sample argument input.
    #[must_use]
    pub fn argument_input(mut self, name: &str) -> Self {
        self.argument_inputs.push(name.to_owned());
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn num_outputs(&self) -> usize {
        self.num_outputs
    }

    #[must_use]
    pub const fn min_inputs(&self) -> usize {
        self.min_inputs
    }

    #[must_use]
    pub const fn max_inputs(&self) -> usize {
        self.max_inputs
    }

    /// # Errors
    ///
    /// [`EagerError::InputCount`] outside `[min_inputs, max_inputs]`.
    pub fn check_input_count(&self, got: usize) -> Result<()> {
        if (self.min_inputs..=self.max_inputs).contains(&got) {
            Ok(())
        } else {
            Err(EagerError::InputCount {
                op: self.name.clone(),
                min: self.min_inputs,
                max: self.max_inputs,
                got,
            })
        }
    }

    /// # Errors
    ///
    /// [`EagerError::InvalidArgument`] if `name` is not a declared argument input.
    pub fn check_argument_input(&self, name: &str) -> Result<()> {
        if self.argument_inputs.iter().any(|a| a == name) {
            Ok(())
        } else {
            Err(EagerError::InvalidArgument(format!(
                "operator `{}` has no argument input `{name}`",
                self.name
            )))
        }
    }

    /// Default layout for an untagged input of rank `sample_dim`.
    ///
    /// `Ok(None)` when the schema declares no layouts for `index`.
    ///
    /// # Errors
    ///
    /// [`EagerError::LayoutRank`] if layouts are declared but none has rank
    /// `sample_dim`.
    pub fn input_layout(&self, index: usize, sample_dim: usize) -> Result<Option<Layout>> {
        let Some(allowed) = self.input_layouts.get(index).filter(|l| !l.is_empty()) else {
            return Ok(None);
        };
        allowed
            .iter()
            .find(|l| l.ndim() == sample_dim)
            .cloned()
            .map(Some)
            .ok_or_else(|| EagerError::LayoutRank {
                index,
                rank: sample_dim,
                allowed: allowed
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_lookup_by_rank() {
        let schema = OpSchema::new("Op")
            .num_inputs(1, 2)
            .input_layouts(1, &["HW", "HWC"]);
        assert_eq!(schema.input_layout(0, 3).unwrap(), None);
        assert_eq!(schema.input_layout(1, 3).unwrap(), Some(Layout::new("HWC")));
        assert_eq!(schema.input_layout(1, 2).unwrap(), Some(Layout::new("HW")));
        assert!(matches!(
            schema.input_layout(1, 1),
            Err(EagerError::LayoutRank { index: 1, rank: 1, .. })
        ));
        assert_eq!(schema.input_layout(5, 1).unwrap(), None);
    }

    #[test]
    fn input_count_range() {
        let schema = OpSchema::new("Op").num_inputs(1, 2);
        assert!(schema.check_input_count(0).is_err());
        assert!(schema.check_input_count(2).is_ok());
        assert!(schema.check_input_count(3).is_err());
    }

    #[test]
    fn argument_inputs_must_be_declared() {
        let schema = OpSchema::new("Op").argument_input("delta");
        assert!(schema.check_argument_input("delta").is_ok());
        assert!(schema.check_argument_input("gamma").is_err());
    }
}
