use state_machines::state_machine;

state_machine! {
    name: GenerationMachine,
    state: GenerationState,
    initial: Ready,
    states: [Ready, Preprocessed, Rewritten, Generated, Accepted, Rejected, Composited, Failed],
    events {
        preprocess { transition: { from: Ready, to: Preprocessed } }
        rewrite {
            transition: { from: Preprocessed, to: Rewritten }
            transition: { from: Rejected, to: Rewritten }
        }
        generate { transition: { from: Rewritten, to: Generated } }
        accept { transition: { from: Generated, to: Accepted } }
        reject { transition: { from: Generated, to: Rejected } }
        compose { transition: { from: Rejected, to: Composited } }
        abort {
            transition: { from: Ready, to: Failed }
            transition: { from: Preprocessed, to: Failed }
            transition: { from: Rewritten, to: Failed }
            transition: { from: Generated, to: Failed }
            transition: { from: Rejected, to: Failed }
        }
    }
}

pub fn ready() -> GenerationMachine<(), Ready> {
    GenerationMachine::new(())
}
