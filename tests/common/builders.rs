//! Comment builders.

use opina::models::Comment;

/// `n` comments with ids `c000`, `c001`, ... and distinct texts.
pub fn numbered(n: usize) -> Vec<Comment> {
    (0..n)
        .map(|i| {
            Comment::new(
                format!("c{:03}", i),
                format!("Comentario número {} sobre la sucursal {}", i, i * 7 + 3),
            )
        })
        .collect()
}

/// Comments from `(id, text)` pairs.
pub fn comments(pairs: &[(&str, &str)]) -> Vec<Comment> {
    pairs
        .iter()
        .map(|(id, text)| Comment::new(*id, *text))
        .collect()
}
