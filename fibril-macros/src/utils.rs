use proc_macro::{TokenStream, TokenTree};

/// Splits a `TokenStream` into comma-separated arguments.
///
/// Commas nested inside groups belong to the group token and are not
/// separators.
pub(crate) fn split_args(input: TokenStream) -> Vec<Vec<TokenTree>> {
    let mut args = Vec::new();
    let mut current = Vec::new();

    for token in input {
        match &token {
            TokenTree::Punct(p) if p.as_char() == ',' => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(token),
        }
    }

    if !current.is_empty() {
        args.push(current);
    }

    args
}

/// Converts a slice of tokens back into Rust source.
///
/// Consecutive identifiers are separated by a space so that `move ||`
/// does not become `move||` and `async move` does not become `asyncmove`.
pub(crate) fn tokens_to_string(tokens: &[TokenTree]) -> String {
    let mut out = String::new();
    let mut prev_was_ident = false;

    for t in tokens {
        let is_ident = matches!(t, TokenTree::Ident(_));

        if prev_was_ident && is_ident {
            out.push(' ');
        }

        out.push_str(&t.to_string());
        prev_was_ident = is_ident;
    }

    out
}

/// Expands to a `compile_error!` carrying `message`.
pub(crate) fn compile_error(message: &str) -> TokenStream {
    format!("::core::compile_error!({message:?});")
        .parse()
        .unwrap()
}
