//! Prompt construction and templated fallbacks.
//!
//! The composer receives products that already passed filtering, ranking,
//! and batching. It never selects or invents products: prompts instruct the
//! generation collaborator to present exactly the listed alternatives, and
//! the fallback strings used when generation fails carry no product names at
//! all (the batch is re-served on the customer's next request instead).

use std::fmt::Write as _;

use restock_core::domain::alternative::Alternative;
use restock_core::domain::conversation::{ConversationTurn, Speaker};

#[derive(Clone, Copy, Debug, Default)]
pub struct MessageComposer;

impl MessageComposer {
    pub fn first_recommendation_prompt(
        &self,
        original_product: &str,
        missing_quantity: Option<u32>,
        batch: &[Alternative],
    ) -> String {
        let mut prompt = String::from(
            "You are a friendly customer-service assistant for a grocery store.\n",
        );
        match missing_quantity {
            Some(quantity) => {
                let _ = writeln!(
                    prompt,
                    "The customer ordered {quantity} of \"{original_product}\", which is unavailable."
                );
            }
            None => {
                let _ = writeln!(
                    prompt,
                    "The customer ordered \"{original_product}\", which is unavailable."
                );
            }
        }
        prompt.push_str(
            "Apologize briefly, then present exactly the substitute products listed below, \
             in the given order. Do not mention any other product and do not re-order them.\n",
        );
        push_product_lines(&mut prompt, batch);
        prompt
    }

    pub fn more_options_prompt(
        &self,
        original_product: &str,
        batch: &[Alternative],
        history: &[ConversationTurn],
    ) -> String {
        let mut prompt = String::from(
            "You are a friendly customer-service assistant for a grocery store.\n",
        );
        let _ = writeln!(
            prompt,
            "The customer asked for further substitutes for \"{original_product}\"."
        );
        prompt.push_str(
            "Present exactly the additional substitute products listed below, in the given \
             order. Do not repeat earlier suggestions and do not invent products.\n",
        );
        push_product_lines(&mut prompt, batch);
        push_history(&mut prompt, history);
        prompt
    }

    pub fn closing_prompt(&self, history: &[ConversationTurn]) -> String {
        let mut prompt = String::from(
            "You are a friendly customer-service assistant for a grocery store.\n\
             The customer is ending the conversation. Reply with a short, warm goodbye. \
             Do not recommend any products.\n",
        );
        push_history(&mut prompt, history);
        prompt
    }

    pub fn generic_prompt(&self, message: &str, history: &[ConversationTurn]) -> String {
        let mut prompt = String::from(
            "You are a friendly customer-service assistant for a grocery store.\n\
             Answer the customer's message helpfully and briefly. Do not recommend or \
             invent any products.\n",
        );
        let _ = writeln!(prompt, "Customer message: {message}");
        push_history(&mut prompt, history);
        prompt
    }

    pub fn no_candidates_message(&self, original_product: &str) -> String {
        format!(
            "I'm sorry - \"{original_product}\" is unavailable and I couldn't find a suitable \
             substitute right now. Would you like anything else from your order adjusted?"
        )
    }

    pub fn exhausted_message(&self) -> String {
        "I'm afraid I've already shown you every alternative I have for that product. \
         Is there anything else I can help you with?"
            .to_owned()
    }

    pub fn no_active_order_message(&self) -> String {
        "I don't have an active substitution request for this conversation. Could you tell \
         me which product from your order is missing?"
            .to_owned()
    }

    /// Generation-failure fallbacks. Deliberately product-free: the batch
    /// that failed to render was not delivered, so it stays unshown and is
    /// re-served on the next request.
    pub fn fallback_recommendation(&self) -> String {
        "I'm sorry - I'm having trouble putting together suggestions right now. Please ask \
         again in a moment."
            .to_owned()
    }

    pub fn fallback_closing(&self) -> String {
        "Thanks for shopping with us. Have a great day!".to_owned()
    }

    pub fn fallback_generic(&self) -> String {
        "I'm sorry - I couldn't process that just now. Could you rephrase, or ask again in \
         a moment?"
            .to_owned()
    }
}

fn push_product_lines(prompt: &mut String, batch: &[Alternative]) {
    prompt.push_str("Products:\n");
    for alternative in batch {
        let _ = write!(prompt, "- {}", alternative.product_name);
        if !alternative.ingredients.is_empty() {
            let _ = write!(prompt, " (ingredients: {})", alternative.ingredients.join(", "));
        }
        if !alternative.allergens.is_empty() {
            let allergens: Vec<_> =
                alternative.allergens.iter().map(String::as_str).collect();
            let _ = write!(prompt, " (contains: {})", allergens.join(", "));
        }
        prompt.push('\n');
    }
}

fn push_history(prompt: &mut String, history: &[ConversationTurn]) {
    if history.is_empty() {
        return;
    }
    prompt.push_str("Conversation so far, for tone only:\n");
    for turn in history {
        let line = match turn.speaker {
            Speaker::Customer => format!("customer said: {}", turn.text),
            Speaker::Assistant => format!("assistant replied: {}", turn.text),
        };
        let _ = writeln!(prompt, "{line}");
    }
}
