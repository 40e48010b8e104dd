/// Execute an aggregate command in place (no IO): decide, then apply.
///
/// Handy in tests and for previewing a command's effect. The services go
/// through the infra dispatcher instead, which also persists and publishes.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: socialstore_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
