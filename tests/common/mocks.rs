//! Mock transfer functions

use mockall::mock;
use monitor_core::{Inputs, Result, Sample, StageContext, TransferFunction};

mock! {
    pub Function {}

    impl TransferFunction for Function {
        fn name(&self) -> &str;
        fn initialize(&mut self, ctx: &StageContext) -> Result<()>;
        fn evaluate(
            &mut self,
            ctx: &StageContext,
            inputs: &Inputs,
            current_output: &Sample,
        ) -> Result<Sample>;
        fn shutdown(&mut self, ctx: &StageContext) -> Result<()>;
    }
}

/// A mock that answers to `name()` and expects nothing else
pub fn named_mock() -> MockFunction {
    let mut mock = MockFunction::new();
    mock.expect_name().return_const("mock".to_string());
    mock
}
