//! Status code literals on HTTP responses become named constants:
//! `$response->setStatusCode(404)` and `$response->getStatusCode() === 200`.

use crate::rewrite::context::RuleContext;
use crate::rewrite::patterns::{NodePattern, PatternMatcher};
use crate::rewrite::rules::{Outcome, Rule, RuleError};
use crate::syntax::{Node, NodeId, NodeKind};

const RESPONSE_CLASS: &str = "\\Symfony\\Component\\HttpFoundation\\Response";

const CODE_TO_CONST: &[(i64, &str)] = &[
    (100, "HTTP_CONTINUE"),
    (101, "HTTP_SWITCHING_PROTOCOLS"),
    (102, "HTTP_PROCESSING"),
    (103, "HTTP_EARLY_HINTS"),
    (200, "HTTP_OK"),
    (201, "HTTP_CREATED"),
    (202, "HTTP_ACCEPTED"),
    (203, "HTTP_NON_AUTHORITATIVE_INFORMATION"),
    (204, "HTTP_NO_CONTENT"),
    (205, "HTTP_RESET_CONTENT"),
    (206, "HTTP_PARTIAL_CONTENT"),
    (207, "HTTP_MULTI_STATUS"),
    (208, "HTTP_ALREADY_REPORTED"),
    (226, "HTTP_IM_USED"),
    (300, "HTTP_MULTIPLE_CHOICES"),
    (301, "HTTP_MOVED_PERMANENTLY"),
    (302, "HTTP_FOUND"),
    (303, "HTTP_SEE_OTHER"),
    (304, "HTTP_NOT_MODIFIED"),
    (305, "HTTP_USE_PROXY"),
    (306, "HTTP_RESERVED"),
    (307, "HTTP_TEMPORARY_REDIRECT"),
    (308, "HTTP_PERMANENTLY_REDIRECT"),
    (400, "HTTP_BAD_REQUEST"),
    (401, "HTTP_UNAUTHORIZED"),
    (402, "HTTP_PAYMENT_REQUIRED"),
    (403, "HTTP_FORBIDDEN"),
    (404, "HTTP_NOT_FOUND"),
    (405, "HTTP_METHOD_NOT_ALLOWED"),
    (406, "HTTP_NOT_ACCEPTABLE"),
    (407, "HTTP_PROXY_AUTHENTICATION_REQUIRED"),
    (408, "HTTP_REQUEST_TIMEOUT"),
    (409, "HTTP_CONFLICT"),
    (410, "HTTP_GONE"),
    (411, "HTTP_LENGTH_REQUIRED"),
    (412, "HTTP_PRECONDITION_FAILED"),
    (413, "HTTP_REQUEST_ENTITY_TOO_LARGE"),
    (414, "HTTP_REQUEST_URI_TOO_LONG"),
    (415, "HTTP_UNSUPPORTED_MEDIA_TYPE"),
    (416, "HTTP_REQUESTED_RANGE_NOT_SATISFIABLE"),
    (417, "HTTP_EXPECTATION_FAILED"),
    (418, "HTTP_I_AM_A_TEAPOT"),
    (421, "HTTP_MISDIRECTED_REQUEST"),
    (422, "HTTP_UNPROCESSABLE_ENTITY"),
    (423, "HTTP_LOCKED"),
    (424, "HTTP_FAILED_DEPENDENCY"),
    (425, "HTTP_TOO_EARLY"),
    (426, "HTTP_UPGRADE_REQUIRED"),
    (428, "HTTP_PRECONDITION_REQUIRED"),
    (429, "HTTP_TOO_MANY_REQUESTS"),
    (431, "HTTP_REQUEST_HEADER_FIELDS_TOO_LARGE"),
    (451, "HTTP_UNAVAILABLE_FOR_LEGAL_REASONS"),
    (500, "HTTP_INTERNAL_SERVER_ERROR"),
    (501, "HTTP_NOT_IMPLEMENTED"),
    (502, "HTTP_BAD_GATEWAY"),
    (503, "HTTP_SERVICE_UNAVAILABLE"),
    (504, "HTTP_GATEWAY_TIMEOUT"),
    (505, "HTTP_VERSION_NOT_SUPPORTED"),
    (506, "HTTP_VARIANT_ALSO_NEGOTIATES_EXPERIMENTAL"),
    (507, "HTTP_INSUFFICIENT_STORAGE"),
    (508, "HTTP_LOOP_DETECTED"),
    (510, "HTTP_NOT_EXTENDED"),
    (511, "HTTP_NETWORK_AUTHENTICATION_REQUIRED"),
];

fn constant_for(code: i64) -> Option<&'static str> {
    CODE_TO_CONST
        .binary_search_by_key(&code, |(value, _)| *value)
        .ok()
        .map(|index| CODE_TO_CONST[index].1)
}

#[derive(Debug, Default)]
pub struct ResponseStatusCode;

impl ResponseStatusCode {
    pub fn new() -> Self {
        ResponseStatusCode
    }
}

fn is_response(ctx: &RuleContext<'_>, object: NodeId) -> bool {
    ctx.static_type(object)
        .is_some_and(|ty| ty.is_object_of(RESPONSE_CLASS))
}

/// `receiver->method(...)` on a response-typed receiver
fn is_response_call(ctx: &RuleContext<'_>, id: NodeId, method: &str) -> bool {
    PatternMatcher::method_call(method).matches(ctx.tree(), id)
        && matches!(ctx.node(id), Node::MethodCall { object, .. } if is_response(ctx, *object))
}

/// Whether the literal at `node` sits in a status-code position
fn in_status_position(ctx: &RuleContext<'_>, node: NodeId) -> bool {
    let Some(parent) = ctx.parent(node) else {
        return false;
    };
    match ctx.node(parent) {
        Node::MethodCall { args, .. } => {
            args.first() == Some(&node) && is_response_call(ctx, parent, "setStatusCode")
        }
        Node::Binary { op, left, right } if op.is_comparison() => {
            let other = if *left == node { *right } else { *left };
            is_response_call(ctx, other, "getStatusCode")
        }
        _ => false,
    }
}

impl Rule for ResponseStatusCode {
    fn name(&self) -> &'static str {
        "response-status-code"
    }

    fn description(&self) -> &'static str {
        "Turns status code numbers to Response constants"
    }

    fn priority(&self) -> u32 {
        120
    }

    fn declared_kinds(&self) -> &'static [NodeKind] {
        &[NodeKind::Number]
    }

    fn apply(&mut self, node: NodeId, ctx: &mut RuleContext<'_>) -> Result<Outcome, RuleError> {
        let Node::Number { value } = ctx.node(node) else {
            return Err(RuleError::shape(node, "expected a number"));
        };
        let Some(constant) = constant_for(*value) else {
            return Ok(Outcome::Unchanged);
        };
        if !in_status_position(ctx, node) {
            return Ok(Outcome::Unchanged);
        }
        let fetch = ctx.alloc(Node::ClassConstFetch {
            class: RESPONSE_CLASS.to_string(),
            constant: constant.to_string(),
        });
        Ok(Outcome::Replace(fetch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::catalog::testing::rewrite;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_table_is_sorted() {
        assert!(CODE_TO_CONST.windows(2).all(|pair| pair[0].0 < pair[1].0));
        assert_eq!(constant_for(418), Some("HTTP_I_AM_A_TEAPOT"));
        assert_eq!(constant_for(299), None);
    }

    #[test]
    fn test_set_and_compare() {
        let source = "class C {\n    function index() {\n        $response = new \\Symfony\\Component\\HttpFoundation\\Response();\n        $response->setStatusCode(200);\n        if ($response->getStatusCode() === 404) {\n        }\n    }\n}\n";
        let expected = "class C {\n    function index() {\n        $response = new \\Symfony\\Component\\HttpFoundation\\Response();\n        $response->setStatusCode(\\Symfony\\Component\\HttpFoundation\\Response::HTTP_OK);\n        if ($response->getStatusCode() === \\Symfony\\Component\\HttpFoundation\\Response::HTTP_NOT_FOUND) {\n        }\n    }\n}\n";
        assert_eq!(rewrite(ResponseStatusCode::new(), source), expected);
    }

    #[test]
    fn test_literal_on_the_left() {
        let source = "$r = new Response();\nif (301 == $r->getStatusCode()) {\n}\n";
        let expected = "$r = new Response();\nif (\\Symfony\\Component\\HttpFoundation\\Response::HTTP_MOVED_PERMANENTLY == $r->getStatusCode()) {\n}\n";
        assert_eq!(rewrite(ResponseStatusCode::new(), source), expected);
    }

    #[test]
    fn test_other_receivers_and_unknown_codes_are_kept() {
        let source = "$r = new Request();\n$r->setStatusCode(200);\n$s = new Response();\n$s->setStatusCode(299);\n";
        assert_eq!(rewrite(ResponseStatusCode::new(), source), source);
    }
}
