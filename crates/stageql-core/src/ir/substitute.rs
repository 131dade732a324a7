use super::{Expr, Param, extracted_name};

/// Replaces every reference to `from` inside `expr` with `to`.
///
/// When `to`'s shape already carries an extracted member for a member chain
/// over `from` (see [`super::extract`]), the chain is replaced by a read of
/// that member instead of being re-evaluated on top of `to`.
pub fn substitute(expr: &Expr, from: &Param, to: &Expr) -> Expr {
    let target = to.shape();
    expr.modify(&mut |node| {
        let path = node.member_path(from)?;
        let name = extracted_name(&path);
        match target.member(&name) {
            Some(shape) => Some(to.clone().member_as(name, shape.clone())),
            None if path.is_empty() => Some(to.clone()),
            None => None,
        }
    })
}
