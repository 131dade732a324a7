use smol_str::SmolStr;

use super::{Expr, Param, extracted_name};

/// Pure sub-expressions keyed by their extracted member name.
pub type Extracted = Vec<(SmolStr, Expr)>;

/// Finds the maximal member chains over `root` inside an expression that
/// contains service calls.
///
/// Returns `None` when `expr` has no service calls or does not read `root` at
/// all. Entries are deduplicated by name and keep first-seen order. A bare
/// reference to `root` is extracted as `__`.
pub fn extract(expr: &Expr, root: &Param) -> Option<Extracted> {
    if !expr.has_services() {
        return None;
    }

    let mut found = Extracted::new();
    expr.walk(&mut |node| match node.member_path(root) {
        Some(path) => {
            let name = extracted_name(&path);
            if found.iter().all(|(n, _)| *n != name) {
                found.push((name, node.clone()));
            }
            false
        }
        None => true,
    });

    (!found.is_empty()).then_some(found)
}
