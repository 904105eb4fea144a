use std::str::FromStr;

use anyhow::anyhow;

use crate::error::{ApiError, ApiResult};

/// A document status with a fixed transition table.
pub trait Workflow: Copy + PartialEq + AsRef<str> + FromStr + 'static {
    type Action: Copy + AsRef<str>;

    /// Human name used in messages, e.g. "purchase request".
    const RESOURCE: &'static str;

    /// Target state, or `None` when `action` is not allowed from `self`.
    fn next(self, action: Self::Action) -> Option<Self>;

    fn transition(self, action: Self::Action) -> ApiResult<Self> {
        self.next(action)
            .ok_or_else(|| rejected(action.as_ref(), self.as_ref(), Self::RESOURCE))
    }

    /// Guard for non-workflow operations such as update or delete.
    fn ensure_one_of(self, allowed: &[Self], verb: &str) -> ApiResult<()> {
        if allowed.contains(&self) {
            Ok(())
        } else {
            Err(rejected(verb, self.as_ref(), Self::RESOURCE))
        }
    }

    /// Parses a status column. An unknown value means corrupt data, not bad input.
    fn parse(raw: &str) -> ApiResult<Self> {
        Self::from_str(raw).map_err(|_| {
            ApiError::Internal(anyhow!("unknown {} status {:?}", Self::RESOURCE, raw))
        })
    }
}

fn rejected(action: &str, status: &str, resource: &str) -> ApiError {
    ApiError::unprocessable(format!(
        "Cannot {} {} in {} status.",
        action.replace('_', " "),
        resource,
        status.replace('_', " ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_renders_underscores_as_spaces() {
        let err = rejected("send_to_supplier", "partially_delivered", "purchase order");
        assert_eq!(
            err.to_string(),
            "Cannot send to supplier purchase order in partially delivered status."
        );
    }
}

#[cfg(test)]
pub mod testing {
    use super::Workflow;

    /// Every (state, action) pair outside `allowed` must be refused, every pair
    /// inside it must land on the listed target.
    pub fn assert_table<W>(states: &[W], actions: &[W::Action], allowed: &[(W, W::Action, W)])
    where
        W: Workflow + std::fmt::Debug,
        W::Action: PartialEq + std::fmt::Debug,
    {
        for &state in states {
            for &action in actions {
                let expected = allowed
                    .iter()
                    .find(|(from, a, _)| *from == state && *a == action)
                    .map(|(_, _, to)| *to);
                assert_eq!(
                    state.next(action),
                    expected,
                    "{:?} --{:?}--> expected {:?}",
                    state,
                    action,
                    expected
                );
                assert_eq!(state.transition(action).is_ok(), expected.is_some());
            }
        }
    }
}
