//! Procedural macros for the Fibril event loop.
//!
//! - `#[fibril::main]` and `#[fibril::test]` run an `async fn` body on a
//!   fresh event loop,
//! - `join!` awaits several futures concurrently.

mod utils;

use proc_macro::{Delimiter, Group, TokenStream, TokenTree};

/// Awaits all the given futures concurrently and returns their outputs as
/// a tuple, in argument order.
#[proc_macro]
pub fn join(input: TokenStream) -> TokenStream {
    let args = utils::split_args(input);

    match args.len() {
        0 => return "()".parse().unwrap(),
        1 => {
            let expr = utils::tokens_to_string(&args[0]);
            return format!("{{ ({expr}).await }}").parse().unwrap();
        }
        _ => {}
    }

    let mut out = String::from("{\n");

    for (i, tokens) in args.iter().enumerate() {
        let expr = utils::tokens_to_string(tokens);
        out.push_str(&format!(
            "let mut __join{i} = (::std::boxed::Box::pin({expr}), ::core::option::Option::None::<_>);\n"
        ));
    }

    out.push_str("::std::future::poll_fn(move |cx| {\n");
    out.push_str("    use ::std::future::Future as _;\n");

    for i in 0..args.len() {
        out.push_str(&format!(
            "    if __join{i}.1.is_none() {{\n\
                     if let ::std::task::Poll::Ready(out) = __join{i}.0.as_mut().poll(cx) {{\n\
                         __join{i}.1 = ::core::option::Option::Some(out);\n\
                     }}\n\
                 }}\n"
        ));
    }

    let ready = (0..args.len())
        .map(|i| format!("__join{i}.1.is_some()"))
        .collect::<Vec<_>>()
        .join(" && ");

    let outputs = (0..args.len())
        .map(|i| format!("__join{i}.1.take().unwrap()"))
        .collect::<Vec<_>>()
        .join(", ");

    out.push_str(&format!(
        "    if {ready} {{ ::std::task::Poll::Ready(({outputs},)) }} else {{ ::std::task::Poll::Pending }}\n"
    ));
    out.push_str("}).await\n}\n");

    out.parse().unwrap_or_else(|err| utils::compile_error(&format!("join macro error: {err}")))
}

/// Runs an `async fn main` on a fresh event loop.
///
/// Accepts an optional `stack_size = <expr>` argument, the stack size of
/// bridge fibers in bytes.
/// A panic or cancellation of the body is re-raised as a panic.
#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    let builder = match event_loop_builder(attr) {
        Ok(builder) => builder,
        Err(err) => return utils::compile_error(&err),
    };

    wrap_body(item, |block| {
        format!(
            "{{
                let event_loop = {builder};
                match event_loop.run_until_complete(async move {{ {block} }}) {{
                    ::core::result::Result::Ok(value) => value,
                    ::core::result::Result::Err(err) => ::core::panic!(\"main task failed: {{}}\", err),
                }}
            }}"
        )
    })
}

/// Runs an `async fn` test on a fresh event loop.
///
/// Accepts the same arguments as `#[fibril::main]`.
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let builder = match event_loop_builder(attr) {
        Ok(builder) => builder,
        Err(err) => return utils::compile_error(&err),
    };

    let body = wrap_body(item, |block| {
        format!(
            "{{
                let event_loop = {builder};
                if let ::core::result::Result::Err(err) =
                    event_loop.run_until_complete(async move {{ {block} }})
                {{
                    ::core::panic!(\"test task failed: {{}}\", err);
                }}
            }}"
        )
    });

    let mut result: TokenStream = "#[test]".parse().unwrap();
    result.extend(body);
    result
}

/// Builds the `EventLoopBuilder` expression for the attribute arguments.
fn event_loop_builder(attr: TokenStream) -> Result<String, String> {
    let mut builder = String::from("::fibril::EventLoopBuilder::new()");

    for arg in utils::split_args(attr) {
        let arg = utils::tokens_to_string(&arg);

        match arg.split_once('=') {
            Some((key, value)) if key.trim() == "stack_size" => {
                let value = value.trim();
                if value.is_empty() {
                    return Err(String::from("stack_size expects a value"));
                }

                builder.push_str(&format!(".fiber_stack_size({value})"));
            }
            _ => return Err(format!("unknown argument `{arg}`")),
        }
    }

    builder.push_str(".build()");
    Ok(builder)
}

/// Drops `async` from the function signature and replaces its body with
/// `wrap(body)`.
fn wrap_body(item: TokenStream, wrap: impl FnOnce(String) -> String) -> TokenStream {
    let mut tokens: Vec<TokenTree> = item.into_iter().collect();

    if let Some(pos) = tokens
        .iter()
        .position(|t| matches!(t, TokenTree::Ident(id) if id.to_string() == "async"))
    {
        tokens.remove(pos);
    }

    let Some(pos) = tokens
        .iter()
        .rposition(|t| matches!(t, TokenTree::Group(g) if g.delimiter() == Delimiter::Brace))
    else {
        return utils::compile_error("expected a function body");
    };

    let TokenTree::Group(group) = &tokens[pos] else {
        return utils::compile_error("expected a function body");
    };
    let block = group.stream().to_string();

    let new_block = match wrap(block).parse() {
        Ok(stream) => stream,
        Err(err) => return utils::compile_error(&format!("failed to expand body: {err}")),
    };

    tokens[pos] = TokenTree::Group(Group::new(Delimiter::Brace, new_block));
    tokens.into_iter().collect()
}
