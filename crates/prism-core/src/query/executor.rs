use std::{collections::HashSet, sync::Arc};

use tracing::trace;

use crate::{CoreError, Element, facets::MessagePairFacet};

use super::{
    PredicateContext, PredicateEvaluator,
    selector::{Bracket, Head, Step},
};

/// 单次查询执行期间不变的上下文。
struct Scope<'q> {
    current: &'q Arc<Element>,
    message: Option<Arc<Element>>,
    request: Option<Arc<Element>>,
    response: Option<Arc<Element>>,
    evaluator: Option<&'q dyn PredicateEvaluator>,
}

impl<'q> Scope<'q> {
    fn new(current: &'q Arc<Element>, evaluator: Option<&'q dyn PredicateEvaluator>) -> Self {
        let message = current.root();
        let partner = message.as_ref().and_then(|message| {
            let pair = message.facet::<MessagePairFacet>()?;
            let partner = pair.partner_of(message.id())?;
            message.arena()?.get(partner)
        });
        let (request, response) = match &message {
            Some(message) if message.is_reply() => (partner, Some(Arc::clone(message))),
            Some(message) => (Some(Arc::clone(message)), partner),
            None => (None, None),
        };
        Self {
            current,
            message,
            request,
            response,
            evaluator,
        }
    }
}

/// 逐段执行：选择 → 透明下降 → 稳定去重 → 空集提前结束；最后过滤不可出现在结果中的节点。
pub(crate) fn run(
    steps: &[Step],
    current: &Arc<Element>,
    evaluator: Option<&dyn PredicateEvaluator>,
) -> Result<Vec<Arc<Element>>, CoreError> {
    let scope = Scope::new(current, evaluator);
    let mut candidates = vec![Arc::clone(current)];
    for step in steps {
        candidates = dedupe(descend_all(apply(step, &candidates, &scope)?));
        trace!(?step, matched = candidates.len(), "path step evaluated");
        if candidates.is_empty() {
            return Ok(candidates);
        }
    }
    candidates.retain(|element| element.keep_in_final_result());
    Ok(candidates)
}

fn apply(step: &Step, candidates: &[Arc<Element>], scope: &Scope<'_>) -> Result<Vec<Arc<Element>>, CoreError> {
    match step {
        Step::Identity => Ok(candidates.to_vec()),
        Step::Descendants => Ok(candidates.iter().flat_map(self_and_descendants).collect()),
        Step::Select { head, brackets } => {
            let mut picked = match head {
                Head::Current => candidates.to_vec(),
                Head::All => candidates.iter().flat_map(|c| c.child_nodes()).collect(),
                Head::Name(name) => candidates
                    .iter()
                    .flat_map(|c| c.children_with_key(name))
                    .collect(),
            };
            for bracket in brackets {
                // 下降是幂等的：已被替换的透明节点不会再次出现。
                picked = select(bracket, &descend_all(picked), scope)?;
            }
            Ok(picked)
        }
    }
}

/// 方括号选择器作用于每个候选的子节点。
fn select(bracket: &Bracket, candidates: &[Arc<Element>], scope: &Scope<'_>) -> Result<Vec<Arc<Element>>, CoreError> {
    let mut selected = Vec::new();
    for candidate in candidates {
        let children = candidate.child_nodes_with_key();
        match bracket {
            Bracket::Index(index) => {
                selected.extend(children.get_index(*index).map(|(_, child)| Arc::clone(child)));
            }
            Bracket::All => selected.extend(children.into_iter().map(|(_, child)| child)),
            Bracket::Names(names) => selected.extend(
                children
                    .into_iter()
                    .filter(|(key, _)| names.iter().any(|name| name.matches(key)))
                    .map(|(_, child)| child),
            ),
            Bracket::Predicate(expression) => {
                let evaluator = scope.evaluator.ok_or_else(|| missing_evaluator(expression))?;
                for (key, child) in children.entries() {
                    let context = PredicateContext {
                        element: child,
                        key,
                        parent: candidate,
                        current: scope.current,
                        message: scope.message.as_ref(),
                        request: scope.request.as_ref(),
                        response: scope.response.as_ref(),
                    };
                    if evaluator.evaluate(expression, &context)? {
                        selected.push(Arc::clone(child));
                    }
                }
            }
        }
    }
    Ok(selected)
}

pub(crate) fn missing_evaluator(expression: &str) -> CoreError {
    CoreError::Predicate {
        expression: expression.to_owned(),
        detail: "no predicate evaluator was supplied".to_owned(),
    }
}

/// 先序遍历：自身，再按文档顺序的全部后代。
fn self_and_descendants(root: &Arc<Element>) -> Vec<Arc<Element>> {
    let mut ordered = Vec::new();
    let mut stack = vec![Arc::clone(root)];
    while let Some(node) = stack.pop() {
        let mut children = node.child_nodes();
        ordered.push(node);
        children.reverse();
        stack.extend(children);
    }
    ordered
}

fn descend_all(elements: Vec<Arc<Element>>) -> Vec<Arc<Element>> {
    elements.iter().flat_map(|element| element.descend_if_advised()).collect()
}

/// 按身份去重，保留第一次出现的位置。
fn dedupe(elements: Vec<Arc<Element>>) -> Vec<Arc<Element>> {
    let mut seen = HashSet::with_capacity(elements.len());
    elements
        .into_iter()
        .filter(|element| seen.insert(Arc::as_ptr(element)))
        .collect()
}
