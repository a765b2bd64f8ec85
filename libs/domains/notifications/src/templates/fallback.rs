//! Built-in WhatsApp message templates used when the template store has no
//! active template or cannot be reached.

use crate::models::NotificationType;

const ORDER_CREATED: &[&str] = &[
    "Olá, {{customer_name}}! 👋\n\n\
Recebemos seu pedido *#{{order_number}}*{{#if table_number}} (mesa {{table_number}}){{/if}}.\n\n\
{{items}}\n\n\
*Total: R$ {{total}}*\
{{#if payment_link}}\n\nPague por aqui: {{payment_link}}{{/if}}\
{{#if tracking_link}}\n\nAcompanhe seu pedido: {{tracking_link}}{{/if}}\n\n\
Obrigado por escolher o {{restaurant_name}}!",
    "Oi, {{customer_name}}! Seu pedido *#{{order_number}}* foi registrado com sucesso.\n\n\
Itens ({{item_count}}):\n{{items}}\n\n\
Valor total: *R$ {{total}}*\
{{#if payment_link}}\n\nLink para pagamento: {{payment_link}}{{/if}}\
{{#if tracking_link}}\n\nStatus em tempo real: {{tracking_link}}{{/if}}\n\n\
{{restaurant_name}}",
    "{{customer_name}}, pedido *#{{order_number}}* confirmado! 🍽️\n\n\
{{items}}\n\n\
Total: R$ {{total}}\
{{#if payment_link}}\n\nFinalize o pagamento: {{payment_link}}{{/if}}\
{{#if tracking_link}}\n\nVeja o andamento: {{tracking_link}}{{/if}}",
];

const PAYMENT_CONFIRMED: &[&str] = &[
    "Pagamento confirmado! ✅\n\n\
{{customer_name}}, recebemos o pagamento do pedido *#{{order_number}}*.\n\n\
{{items}}\n\n\
*Total pago: R$ {{total}}*\n\n\
Já estamos cuidando de tudo. Avisaremos quando começar o preparo.",
    "Oi, {{customer_name}}! O pagamento de *R$ {{total}}* do pedido *#{{order_number}}* foi aprovado.\n\n\
Resumo:\n{{items}}\n\n\
Obrigado pela preferência! {{restaurant_name}}",
    "{{customer_name}}, tudo certo com seu pagamento! 💳\n\n\
Pedido *#{{order_number}}* ({{item_count}} itens):\n{{items}}\n\n\
Total: R$ {{total}}",
];

const PREPARING: &[&str] = &[
    "{{customer_name}}, seu pedido *#{{order_number}}* já está sendo preparado! 👨‍🍳\n\n\
Avisaremos assim que estiver pronto.",
    "Mãos à obra! O pedido *#{{order_number}}* entrou na cozinha, {{customer_name}}.\n\n\
Em breve ele estará pronto.",
    "Oi, {{customer_name}}! Começamos a preparar o pedido *#{{order_number}}*.\
{{#if table_number}} Vamos levá-lo até a mesa {{table_number}}.{{/if}}",
];

const READY: &[&str] = &[
    "🎉 {{customer_name}}, seu pedido *#{{order_number}}* está pronto!\
{{#if table_number}}\n\nJá estamos levando até a mesa {{table_number}}.{{else}}\n\nPode retirar no balcão.{{/if}}\n\n\
Bom apetite!",
    "Pedido *#{{order_number}}* pronto, {{customer_name}}! 🍽️\n\n\
Obrigado por escolher o {{restaurant_name}}.",
    "{{customer_name}}, está pronto! O pedido *#{{order_number}}* aguarda por você.\n\n\
Bom apetite!",
];

const CUSTOM: &[&str] = &[
    "{{customer_name}}, temos uma atualização sobre o seu pedido *#{{order_number}}*.",
];

/// Phrasing variants for a notification type. Never empty.
pub(crate) fn variants(template_type: NotificationType) -> &'static [&'static str] {
    match template_type {
        NotificationType::OrderCreated => ORDER_CREATED,
        NotificationType::PaymentConfirmed => PAYMENT_CONFIRMED,
        NotificationType::Preparing => PREPARING,
        NotificationType::Ready => READY,
        NotificationType::Custom => CUSTOM,
    }
}
