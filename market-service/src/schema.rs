diesel::table! {
    inventory (id) {
        id -> Uuid,
        product_id -> Uuid,
        available_quantity -> Int4,
        reserved_quantity -> Int4,
        sold_quantity -> Int4,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    stock_reservations (id) {
        id -> Uuid,
        product_id -> Uuid,
        holder_id -> Varchar,
        quantity -> Int4,
        status -> Varchar,
        expires_at -> Timestamptz,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    orders (id) {
        id -> Uuid,
        buyer_id -> Uuid,
        numero -> Varchar,
        status -> Varchar,
        metodo_envio -> Nullable<Varchar>,
        transportadora -> Nullable<Varchar>,
        codigo_rastreio -> Nullable<Varchar>,
        endereco_entrega -> Jsonb,
        data_pedido -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    order_items (id) {
        id -> Uuid,
        order_id -> Uuid,
        seller_id -> Uuid,
        product_id -> Uuid,
        quantity -> Int4,
        subtotal -> Numeric,
        created_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    financial_transactions (id) {
        id -> Uuid,
        seller_id -> Uuid,
        order_item_id -> Nullable<Uuid>,
        tipo -> Varchar,
        valor -> Numeric,
        status -> Varchar,
        data_transacao -> Nullable<Timestamptz>,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    inventory,
    stock_reservations,
    orders,
    order_items,
    financial_transactions,
);
