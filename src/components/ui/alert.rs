use leptos::prelude::*;
use leptos_ui::clx;
use tw_merge::tw_merge;

mod components {
    use super::*;
    clx! {Alert, div, "relative w-full rounded-lg border px-4 py-3 text-sm"}
    clx! {AlertDescription, p, "text-sm leading-relaxed"}
}

pub use components::*;

/// Destructive alert carrying a single message.
#[component]
pub fn ErrorAlert(#[prop(into)] message: String, #[prop(into, optional)] class: String) -> impl IntoView {
    let merged_class = tw_merge!("border-destructive/30", class);

    view! {
        <Alert class=merged_class attr:role="alert">
            <AlertDescription class="text-destructive text-xs">{message}</AlertDescription>
        </Alert>
    }
}
