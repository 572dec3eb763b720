/// Formats an error and every error in its `source()` chain, one cause per line.
///
/// Used by the `Debug` implementation of our error types so that logs show where
/// an error comes from, not only its top-level message.
pub fn error_chain_fmt(
    e: &impl std::error::Error,
    f: &mut std::fmt::Formatter<'_>,
) -> std::fmt::Result {
    writeln!(f, "{}", e)?;

    let mut current = e.source();
    while let Some(cause) = current {
        writeln!(f, "Caused by:\n\t{}", cause)?;
        current = cause.source();
    }

    Ok(())
}
