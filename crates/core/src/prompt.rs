//! Prompt text.

use crate::component::Component;
use crate::sandbox::IMPORT_PREFIX;
use crate::testing_type::TestingType;

const VUE_JEST_SYSTEM: &str = "You are an expert in testing Vue 3 components \
with Jest and vue-test-utils 2. You answer with a single fenced JavaScript \
code block containing the complete test file and nothing else. When you are \
given test failures, you reply with the corrected complete test file.";

const JS_MOCHA_SYSTEM: &str = "You are an expert in testing JavaScript \
modules with Mocha and Chai. You answer with a single fenced JavaScript code \
block containing the complete test file and nothing else.";

/// Returns the system message of `testing_type`.
pub fn system_message(testing_type: TestingType) -> &'static str {
    match testing_type {
        TestingType::VueJest => VUE_JEST_SYSTEM,
        TestingType::JsMocha => JS_MOCHA_SYSTEM,
    }
}

/// Builds the first user message of a session.
pub fn initial_query(
    testing_type: TestingType,
    component: &Component,
    best_practices: &str,
) -> String {
    let name = component.name();
    let rules = match testing_type {
        TestingType::VueJest => {
            "\
1. Write tests for Vue 3 with vue-test-utils 2; never use Vue 2 APIs such as \
createLocalVue or Vue.use.
2. Cover every prop, event, computed property and branch.
3. Use shallowMount and stub child components.
4. Mock browser APIs (FileReader, DataTransfer) and the Vuex store, \
including commit and dispatch.
5. Follow the describe-it-expect pattern.
6. Output only code."
        }
        TestingType::JsMocha => {
            "\
1. Use Mocha for the suite and Chai for assertions.
2. Cover every function, branch and error path.
3. Prepare and clean up with before/after hooks; do not touch global state.
4. Stub console output and external dependencies with sinon.
5. Output only code."
        }
    };
    format!(
        "Write comprehensive unit tests for the component below.\n\n\
Rules:\n{rules}\n\n\
Import the component from '{IMPORT_PREFIX}/{name}'.\n\n\
Component name: {name}\n\n\
Best practices to follow:\n{best_practices}\n\n\
Component source:\n{source}\n",
        source = component.source(),
    )
}
