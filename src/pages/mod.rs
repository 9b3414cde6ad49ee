use crate::auth::{sign_in, sign_out, validate_credentials};
use crate::clipboard::{read_as_data_url, read_paste, Pasted};
use crate::components::ui::{
    Button, ButtonSize, ButtonVariant, Card, CardContent, CardDescription, CardHeader, CardTitle,
    ErrorAlert, Input, Label, Spinner,
};
use crate::controller::{NoteEvent, NotesSession, SessionOptions};
use crate::models::User;
use crate::runtime::{BrowserScheduler, LocalSpawner, Spawner};
use crate::state::{AppContext, AppState};
use crate::store::HttpNoteStore;
use crate::surface::dom::{
    card_id_of, editable_of, event_element, DELETE_IMAGE_ACTION, DELETE_NOTE_ACTION,
};
use crate::surface::{DomSurface, ViewState};
use crate::util::now_ms;
use leptos::ev;
use leptos::html;
use leptos::logging::error;
use leptos::prelude::*;
use leptos::task::spawn_local;
use leptos_dom::helpers::{window_event_listener, window_event_listener_untyped};
use leptos_router::hooks::use_navigate;
use std::rc::Rc;
use wasm_bindgen::JsCast;

type BrowserSession = NotesSession<DomSurface, BrowserScheduler>;
type SessionSlot = StoredValue<Option<BrowserSession>, LocalStorage>;

#[component]
pub fn LoginPage() -> impl IntoView {
    let email: RwSignal<String> = RwSignal::new(String::new());
    let password: RwSignal<String> = RwSignal::new(String::new());
    let error: RwSignal<Option<String>> = RwSignal::new(None);
    let loading: RwSignal<bool> = RwSignal::new(false);

    let app_state = expect_context::<AppContext>();
    let navigate = StoredValue::new(use_navigate());

    let on_submit = move |ev: web_sys::SubmitEvent| {
        ev.prevent_default();

        let email_val = email.get();
        let password_val = password.get();
        if let Err(msg) = validate_credentials(&email_val, &password_val) {
            error.set(Some(msg.to_string()));
            return;
        }

        loading.set(true);
        error.set(None);

        let state = app_state.0.clone();
        spawn_local(async move {
            match sign_in(&state, &email_val, &password_val).await {
                Ok(_) => {
                    navigate.with_value(|nav| nav("/", Default::default()));
                }
                Err(e) => {
                    error.set(Some(e.to_string()));
                }
            }
            loading.set(false);
        });
    };

    view! {
        <div class="min-h-screen bg-background">
            <div class="mx-auto flex min-h-screen w-full max-w-sm flex-col justify-center px-4 py-10">
                <div class="mb-6 flex items-center justify-center">
                    <span class="text-sm font-medium text-foreground">"Jotter"</span>
                </div>

                <Card>
                    <CardHeader>
                        <CardTitle class="text-lg">"Sign in"</CardTitle>
                        <CardDescription class="text-xs">"Your notes sync across every open session."</CardDescription>
                    </CardHeader>

                    <CardContent>
                        <form class="flex flex-col gap-3" on:submit=on_submit>
                            <div class="flex flex-col gap-1.5">
                                <Label html_for="email" class="text-xs">"Email"</Label>
                                <Input
                                    id="email"
                                    r#type="email"
                                    placeholder="you@example.com"
                                    autocomplete="username"
                                    bind_value=email
                                    required=true
                                    class="h-8 text-sm"
                                />
                            </div>

                            <div class="flex flex-col gap-1.5">
                                <Label html_for="password" class="text-xs">"Password"</Label>
                                <Input
                                    id="password"
                                    r#type="password"
                                    placeholder="••••••••"
                                    autocomplete="current-password"
                                    bind_value=password
                                    required=true
                                    class="h-8 text-sm"
                                />
                            </div>

                            {move || error.get().map(|e| view! { <ErrorAlert message=e /> })}

                            <Button
                                class="w-full"
                                size=ButtonSize::Sm
                                attr:disabled=move || loading.get()
                            >
                                <span class="inline-flex items-center gap-2">
                                    <Show when=move || loading.get()>
                                        <Spinner />
                                    </Show>
                                    {move || if loading.get() { "Signing in..." } else { "Continue" }}
                                </span>
                            </Button>
                        </form>
                    </CardContent>
                </Card>
            </div>
        </div>
    }
}

/// Shows the notes for a signed-in user, the login form otherwise.
#[component]
pub fn HomePage() -> impl IntoView {
    let app_state = expect_context::<AppContext>();
    let signed_in = move || app_state.0.current_user.with(|u| u.is_some());

    view! {
        <Show when=signed_in fallback=move || view! { <LoginPage /> }>
            <NotesPage />
        </Show>
    }
}

fn start_session(
    state: &AppState,
    user: &User,
    container: web_sys::HtmlElement,
    view_state: RwSignal<ViewState>,
) -> BrowserSession {
    let spawner: Rc<dyn Spawner> = Rc::new(LocalSpawner);
    let store = HttpNoteStore::new(
        state.api_client.get_untracked(),
        spawner.clone(),
        state.config.poll_ms,
    );

    let on_unauthorized = {
        let state = state.clone();
        Rc::new(move || sign_out(&state)) as Rc<dyn Fn()>
    };

    NotesSession::start(
        Rc::new(store),
        DomSurface::new(container, view_state),
        BrowserScheduler,
        spawner,
        SessionOptions {
            owner_id: user.id.clone(),
            autosave_ms: state.config.autosave_ms,
            clock: Rc::new(now_ms),
            on_unauthorized: Some(on_unauthorized),
        },
    )
}

/// Hand an event to the live session, if any.
///
/// The session is cloned out first: handling may synchronously fire DOM
/// events whose handlers come back here.
fn send(slot: SessionSlot, event: NoteEvent) {
    if let Some(session) = slot.try_with_value(|s| s.clone()).flatten() {
        session.dispatch(event);
    }
}

fn stop(slot: SessionSlot) {
    if let Some(old) = slot.try_update_value(|s| s.take()).flatten() {
        old.shutdown();
    }
}

#[component]
pub fn NotesPage() -> impl IntoView {
    let app_state = expect_context::<AppContext>();
    let container: NodeRef<html::Div> = NodeRef::new();
    let view_state: RwSignal<ViewState> = RwSignal::new(ViewState::Loading);
    let session: SessionSlot = StoredValue::new_local(None);

    let current_user = app_state.0.current_user;

    // One session per signed-in user; rebuilt when the user changes.
    let state = app_state.0.clone();
    Effect::new(move |_| {
        let user = current_user.get();
        let el = container.get();
        stop(session);

        let (Some(user), Some(el)) = (user, el) else {
            return;
        };
        let el: web_sys::HtmlElement = el.unchecked_into();
        // Cards left over from a previous session.
        el.set_inner_html("");
        view_state.set(ViewState::Loading);
        session.set_value(Some(start_session(&state, &user, el, view_state)));
    });

    // Ctrl/Cmd+D: new note. Ctrl/Cmd+Q: delete the newest note.
    let key_handle = window_event_listener(ev::keydown, move |ev: web_sys::KeyboardEvent| {
        if !(ev.meta_key() || ev.ctrl_key()) {
            return;
        }
        match ev.key().to_lowercase().as_str() {
            "d" => {
                ev.prevent_default();
                send(session, NoteEvent::CreateRequested);
            }
            "q" => {
                ev.prevent_default();
                send(session, NoteEvent::DeleteNewest);
            }
            _ => {}
        }
    });

    let pagehide_handle =
        window_event_listener(ev::pagehide, move |_ev: web_sys::PageTransitionEvent| {
            send(session, NoteEvent::PageHidden);
        });
    let unload_handle = window_event_listener(ev::beforeunload, move |_| {
        send(session, NoteEvent::PageHidden);
    });
    // `visibilitychange` bubbles from the document to the window.
    let visibility_handle = window_event_listener_untyped("visibilitychange", move |_| {
        let hidden = document().visibility_state() == web_sys::VisibilityState::Hidden;
        if hidden {
            send(session, NoteEvent::PageHidden);
        }
    });

    on_cleanup(move || {
        key_handle.remove();
        pagehide_handle.remove();
        unload_handle.remove();
        visibility_handle.remove();
        stop(session);
    });

    let on_input = move |ev: web_sys::Event| {
        if let Some(id) = event_element(&ev).and_then(|t| card_id_of(&t)) {
            send(session, NoteEvent::Input { id });
        }
    };

    let on_focusout = move |ev: web_sys::FocusEvent| {
        if let Some(id) = event_element(&ev).and_then(|t| card_id_of(&t)) {
            send(session, NoteEvent::Blur { id });
        }
    };

    let on_focusin = move |ev: web_sys::FocusEvent| {
        if let Some(id) = event_element(&ev).and_then(|t| card_id_of(&t)) {
            send(session, NoteEvent::Focus { id });
        }
    };

    // Paste never inserts foreign markup: plain text or an image only.
    let on_paste = move |ev: web_sys::ClipboardEvent| {
        let Some(target) = event_element(&ev) else {
            return;
        };
        let (Some(id), Some(region)) = (card_id_of(&target), editable_of(&target)) else {
            return;
        };
        ev.prevent_default();

        match read_paste(&ev) {
            Pasted::Text(text) => {
                region.insert_text(&text);
                send(session, NoteEvent::Input { id });
            }
            Pasted::Image(file) => {
                spawn_local(async move {
                    match read_as_data_url(&file).await {
                        Ok(url) => {
                            region.insert_image(&url);
                            send(session, NoteEvent::Commit { id });
                        }
                        Err(e) => error!("pasting image into note {id} failed: {e}"),
                    }
                });
            }
            Pasted::Nothing => {}
        }
    };

    let on_click = move |ev: web_sys::MouseEvent| {
        let Some(action) = event_element(&ev)
            .and_then(|t| t.closest("[data-action]").ok().flatten())
        else {
            return;
        };
        let Some(id) = card_id_of(&action) else {
            return;
        };

        match action.get_attribute("data-action").as_deref() {
            Some(DELETE_NOTE_ACTION) => {
                send(session, NoteEvent::DeleteRequested { id });
            }
            Some(DELETE_IMAGE_ACTION) => {
                ev.prevent_default();
                let figure = action.closest("figure").ok().flatten();
                if let (Some(figure), Some(region)) = (figure, editable_of(&action)) {
                    if region.remove_figure(&figure) {
                        send(session, NoteEvent::Commit { id });
                    }
                }
            }
            _ => {}
        }
    };

    let on_sign_out = move |_| {
        stop(session);
        sign_out(&app_state.0);
    };

    let user_label = move || {
        current_user.with(|u| u.as_ref().map(|u| u.id.clone()).unwrap_or_default())
    };

    view! {
        <div class="min-h-screen bg-background">
            <header class="mx-auto flex w-full max-w-2xl items-center justify-between gap-2 px-4 py-4">
                <span class="text-sm font-medium text-foreground">"Jotter"</span>
                <div class="flex items-center gap-2">
                    <span class="text-xs text-muted-foreground">{user_label}</span>
                    <Button
                        size=ButtonSize::Sm
                        attr:title="New note (Ctrl+D)"
                        on:click=move |_| send(session, NoteEvent::CreateRequested)
                    >
                        "New note"
                    </Button>
                    <Button size=ButtonSize::Sm variant=ButtonVariant::Ghost on:click=on_sign_out>
                        "Sign out"
                    </Button>
                </div>
            </header>

            <main class="mx-auto w-full max-w-2xl px-4 pb-10">
                <Show when=move || view_state.get() == ViewState::Loading>
                    <div class="flex justify-center py-10">
                        <Spinner class="size-5" label="Loading notes" />
                    </div>
                </Show>

                {move || match view_state.get() {
                    ViewState::Failed(message) => Some(view! { <ErrorAlert message=message /> }),
                    _ => None,
                }}

                <Show when=move || view_state.get() == ViewState::Empty>
                    <p class="notes-empty py-10 text-center text-sm text-muted-foreground">
                        "No notes yet. Press Ctrl+D or \u{201c}New note\u{201d} to start one."
                    </p>
                </Show>

                // Cards are owned by the session's surface, not by this view.
                <div
                    node_ref=container
                    class="notes flex flex-col gap-3"
                    class:hidden=move || matches!(view_state.get(), ViewState::Failed(_))
                    on:input=on_input
                    on:focusout=on_focusout
                    on:focusin=on_focusin
                    on:paste=on_paste
                    on:click=on_click
                ></div>
            </main>
        </div>
    }
}
